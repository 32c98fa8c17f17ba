//! Account and card provisioning
//!
//! Shared by approval (inside its transaction) and the standalone
//! account/card endpoints. Numbers are checked for uniqueness before the
//! insert; the unique constraints still catch a concurrent collision.

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::domain::account::{last_four, Account};
use crate::domain::card::Card;
use crate::domain::generators::{
    generate_account_number, generate_card_number, generate_cvv, generate_unique,
};
use crate::domain::{mask_number, AccountType, CardExpiry, CardType};
use crate::error::AppError;

use super::store::{ACCOUNT_COLUMNS, CARD_COLUMNS};
use super::IssuedCard;

/// Partial unique index: one live (active or frozen) card per type and account
const LIVE_CARD_INDEX: &str = "uq_cards_account_type_live";

pub(crate) fn violates_live_card_index(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db) if db.constraint() == Some(LIVE_CARD_INDEX))
}

/// Fresh account number not present in `accounts`
pub(crate) async fn unique_account_number(pool: &PgPool) -> Result<String, AppError> {
    generate_unique(
        "account number",
        || generate_account_number(&mut rand::thread_rng()),
        |candidate| async move {
            let taken: bool = sqlx::query_scalar(
                "SELECT EXISTS (SELECT 1 FROM accounts WHERE account_number = $1)",
            )
            .bind(candidate)
            .fetch_one(pool)
            .await?;
            Ok::<bool, AppError>(taken)
        },
    )
    .await
}

/// Fresh Luhn-valid card number under `bin` not present in `cards`
pub(crate) async fn unique_card_number(pool: &PgPool, bin: &str) -> Result<String, AppError> {
    generate_unique(
        "card number",
        || generate_card_number(&mut rand::thread_rng(), bin),
        |candidate| async move {
            let taken: bool =
                sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM cards WHERE card_number = $1)")
                    .bind(candidate)
                    .fetch_one(pool)
                    .await?;
            Ok::<bool, AppError>(taken)
        },
    )
    .await
}

/// Values for a new `accounts` row
#[derive(Debug, Clone)]
pub(crate) struct NewAccount {
    pub user_id: Uuid,
    pub account_type: AccountType,
    pub account_number: String,
    pub routing_number: String,
    pub opening_balance: Decimal,
}

pub(crate) async fn insert_account(
    conn: &mut PgConnection,
    account: &NewAccount,
) -> Result<Account, AppError> {
    let sql = format!(
        r#"
        INSERT INTO accounts (user_id, account_number, routing_number, account_type, balance, status)
        VALUES ($1, $2, $3, $4, $5, 'active')
        RETURNING {}
        "#,
        ACCOUNT_COLUMNS
    );

    let row = sqlx::query_as::<_, Account>(&sql)
        .bind(account.user_id)
        .bind(&account.account_number)
        .bind(&account.routing_number)
        .bind(account.account_type.as_str())
        .bind(account.opening_balance)
        .fetch_one(&mut *conn)
        .await?;

    tracing::debug!(
        account_id = %row.id,
        user_id = %row.user_id,
        account_type = %account.account_type,
        "Account inserted"
    );
    Ok(row)
}

/// Values for a new `cards` row
#[derive(Debug, Clone)]
pub(crate) struct NewCard {
    pub user_id: Uuid,
    pub account_id: Uuid,
    pub card_number: String,
    pub cardholder_name: String,
    pub card_type: CardType,
    pub spending_limit: Option<Decimal>,
    pub validity_years: u32,
}

pub(crate) async fn insert_card(conn: &mut PgConnection, card: &NewCard) -> Result<Card, AppError> {
    let expiry = CardExpiry::from_issue_date(Utc::now(), card.validity_years);
    let cvv = generate_cvv(&mut rand::thread_rng());

    let sql = format!(
        r#"
        INSERT INTO cards (
            user_id, account_id, card_number, last_four, cvv, cardholder_name,
            expiry_month, expiry_year, card_type, status, spending_limit
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'active', $10)
        RETURNING {}
        "#,
        CARD_COLUMNS
    );

    let row = sqlx::query_as::<_, Card>(&sql)
        .bind(card.user_id)
        .bind(card.account_id)
        .bind(&card.card_number)
        .bind(last_four(&card.card_number))
        .bind(&cvv)
        .bind(&card.cardholder_name)
        .bind(expiry.month as i32)
        .bind(expiry.year)
        .bind(card.card_type.as_str())
        .bind(card.spending_limit)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| {
            if violates_live_card_index(&e) {
                AppError::Conflict(format!(
                    "account {} already has a live {} card",
                    card.account_id, card.card_type
                ))
            } else {
                AppError::Database(e)
            }
        })?;

    tracing::debug!(card_id = %row.id, account_id = %row.account_id, "Card inserted");
    Ok(row)
}

/// Response view of a card
pub(crate) fn issued_card_view(card: &Card, card_type: CardType) -> IssuedCard {
    IssuedCard {
        card_id: card.id,
        account_id: card.account_id,
        card_type,
        masked_number: mask_number(&card.card_number),
        last_four: card.last_four.clone(),
        expiry: card.expiry().to_string(),
    }
}
