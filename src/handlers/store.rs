//! Row lookups shared by the handlers and read endpoints

use sqlx::PgExecutor;
use uuid::Uuid;

use crate::domain::account::Account;
use crate::domain::card::Card;
use crate::domain::{Application, Profile};
use crate::error::AppError;

const APPLICATION_COLUMNS: &str = "id, email, first_name, last_name, phone, date_of_birth, \
     address_line1, address_line2, city, state, postal_code, country, status, \
     rejection_reason, reviewed_by, reviewed_at, user_id, created_at, updated_at";

pub(crate) const ACCOUNT_COLUMNS: &str =
    "id, user_id, account_number, routing_number, account_type, balance, currency, status, created_at";

pub(crate) const CARD_COLUMNS: &str = "id, user_id, account_id, card_number, last_four, \
     cardholder_name, expiry_month, expiry_year, card_type, status, spending_limit, created_at";

const PROFILE_COLUMNS: &str = "id, application_id, email, first_name, last_name, phone, \
     payment_customer_id, status, created_at, updated_at";

/// Row lock for read-modify-write inside a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lock {
    None,
    ForUpdate,
}

impl Lock {
    fn clause(self) -> &'static str {
        match self {
            Lock::None => "",
            Lock::ForUpdate => " FOR UPDATE",
        }
    }
}

pub(crate) async fn fetch_application<'e>(
    executor: impl PgExecutor<'e>,
    id: Uuid,
    lock: Lock,
) -> Result<Application, AppError> {
    let sql = format!(
        "SELECT {} FROM applications WHERE id = $1{}",
        APPLICATION_COLUMNS,
        lock.clause()
    );
    sqlx::query_as::<_, Application>(&sql)
        .bind(id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| AppError::ApplicationNotFound(id.to_string()))
}

pub(crate) async fn fetch_profile<'e>(
    executor: impl PgExecutor<'e>,
    user_id: Uuid,
) -> Result<Profile, AppError> {
    let sql = format!("SELECT {} FROM profiles WHERE id = $1", PROFILE_COLUMNS);
    sqlx::query_as::<_, Profile>(&sql)
        .bind(user_id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| AppError::UserNotFound(user_id.to_string()))
}

/// Emails compare case-insensitively
pub(crate) async fn profile_email_exists<'e>(
    executor: impl PgExecutor<'e>,
    email: &str,
) -> Result<bool, AppError> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM profiles WHERE lower(email) = lower($1))",
    )
    .bind(email.trim())
    .fetch_one(executor)
    .await?;

    Ok(exists)
}

pub(crate) async fn fetch_account<'e>(
    executor: impl PgExecutor<'e>,
    account_id: Uuid,
    lock: Lock,
) -> Result<Account, AppError> {
    let sql = format!(
        "SELECT {} FROM accounts WHERE id = $1{}",
        ACCOUNT_COLUMNS,
        lock.clause()
    );
    sqlx::query_as::<_, Account>(&sql)
        .bind(account_id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| AppError::AccountNotFound(account_id.to_string()))
}

pub(crate) async fn fetch_card<'e>(
    executor: impl PgExecutor<'e>,
    card_id: Uuid,
    lock: Lock,
) -> Result<Card, AppError> {
    let sql = format!(
        "SELECT {} FROM cards WHERE id = $1{}",
        CARD_COLUMNS,
        lock.clause()
    );
    sqlx::query_as::<_, Card>(&sql)
        .bind(card_id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| AppError::CardNotFound(card_id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_clause() {
        assert_eq!(Lock::None.clause(), "");
        assert_eq!(Lock::ForUpdate.clause(), " FOR UPDATE");
    }

    #[test]
    fn test_card_columns_exclude_cvv() {
        assert!(!CARD_COLUMNS.contains("cvv"));
    }
}
