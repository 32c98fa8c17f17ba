//! Account Provisioning Handler
//!
//! Opens an additional account for an existing customer, optionally
//! funded by an initial deposit recorded as a credit transaction.

use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::audit::{AuditAction, AuditLogBuilder, AuditLogService};
use crate::domain::transaction::CATEGORY_INITIAL_DEPOSIT;
use crate::domain::{AdjustmentDirection, OperationContext};
use crate::error::AppError;
use crate::notifications::{EmailTemplate, NotificationService};
use crate::state::{AppState, ProvisioningSettings};

use super::provisioning::{insert_account, unique_account_number, NewAccount};
use super::store::fetch_profile;
use super::{require_admin, CreateAccountCommand, CreateAccountResult};

pub struct CreateAccountHandler {
    pool: PgPool,
    notifier: NotificationService,
    audit: AuditLogService,
    settings: ProvisioningSettings,
}

impl CreateAccountHandler {
    pub fn new(state: &AppState) -> Self {
        Self {
            pool: state.pool.clone(),
            notifier: state.notifier.clone(),
            audit: AuditLogService::new(state.pool.clone()),
            settings: state.settings.clone(),
        }
    }

    pub async fn execute(
        &self,
        command: CreateAccountCommand,
        context: &OperationContext,
    ) -> Result<CreateAccountResult, AppError> {
        let admin_id = require_admin(context)?;
        let profile = fetch_profile(&self.pool, command.user_id).await?;

        let account_number = unique_account_number(&self.pool).await?;
        let opening_balance = command
            .initial_deposit
            .map(|amount| amount.value())
            .unwrap_or(Decimal::ZERO);

        let mut tx = self.pool.begin().await?;

        let account = insert_account(
            &mut tx,
            &NewAccount {
                user_id: profile.id,
                account_type: command.account_type,
                account_number,
                routing_number: self.settings.routing_number.clone(),
                opening_balance,
            },
        )
        .await?;

        let initial_transaction_id = match command.initial_deposit {
            Some(amount) => {
                let id: Uuid = sqlx::query_scalar(
                    r#"
                    INSERT INTO transactions (
                        account_id, user_id, amount, transaction_type, category,
                        description, status, balance_after, created_by
                    )
                    VALUES ($1, $2, $3, $4, $5, 'Initial deposit', 'completed', $6, $7)
                    RETURNING id
                    "#,
                )
                .bind(account.id)
                .bind(profile.id)
                .bind(amount.value())
                .bind(AdjustmentDirection::Credit.as_str())
                .bind(CATEGORY_INITIAL_DEPOSIT)
                .bind(account.balance)
                .bind(admin_id)
                .fetch_one(&mut *tx)
                .await?;
                Some(id)
            }
            None => None,
        };

        tx.commit().await?;

        tracing::info!(
            account_id = %account.id,
            user_id = %profile.id,
            account_type = %command.account_type,
            funded = initial_transaction_id.is_some(),
            "Account opened"
        );

        let masked_number = account.masked_number();

        self.audit
            .record(
                AuditLogBuilder::new(AuditAction::AccountOpened)
                    .resource("account", account.id)
                    .after_state(&serde_json::json!({
                        "user_id": profile.id,
                        "account_type": command.account_type,
                        "account_number": masked_number,
                        "balance": account.balance,
                        "initial_transaction_id": initial_transaction_id,
                    })),
                context,
            )
            .await;

        let email_sent = self
            .notifier
            .notify(
                &profile.email,
                EmailTemplate::AccountOpened {
                    first_name: profile.first_name.clone(),
                    account_type: command.account_type,
                    masked_number: masked_number.clone(),
                    opening_balance: account.balance,
                },
            )
            .await;

        Ok(CreateAccountResult {
            account_id: account.id,
            user_id: profile.id,
            account_type: command.account_type,
            masked_number,
            routing_number: account.routing_number,
            balance: account.balance,
            initial_transaction_id,
            email_sent,
        })
    }
}
