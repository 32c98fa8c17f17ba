//! Manual Transaction Adjustment Handler
//!
//! Credits or debits an account on behalf of staff. The account row is
//! locked for the read-modify-write so concurrent adjustments serialize.
//! An optional idempotency key makes retries safe.

use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::audit::{AuditAction, AuditLogBuilder, AuditLogService};
use crate::domain::transaction::CATEGORY_MANUAL_ADJUSTMENT;
use crate::domain::OperationContext;
use crate::error::AppError;
use crate::idempotency::{IdempotencyOutcome, IdempotencyRepository};
use crate::notifications::{EmailTemplate, NotificationService};
use crate::state::AppState;

use super::store::{fetch_account, fetch_profile, Lock};
use super::{require_admin, AdjustTransactionCommand, AdjustmentResult};

/// HTTP status stored with a completed adjustment
const CREATED: i32 = 201;

/// Result of an adjustment request
#[derive(Debug, Clone)]
pub enum AdjustmentOutcome {
    /// The adjustment was applied by this request
    Applied(AdjustmentResult),
    /// Same key and body seen before; the stored response is returned
    Replayed { status: i32, body: serde_json::Value },
}

/// Balance change written inside the transaction
struct Applied {
    transaction_id: Uuid,
    user_id: Uuid,
    masked_number: String,
    balance_before: Decimal,
    balance_after: Decimal,
}

pub struct AdjustTransactionHandler {
    pool: PgPool,
    idempotency: IdempotencyRepository,
    notifier: NotificationService,
    audit: AuditLogService,
}

impl AdjustTransactionHandler {
    pub fn new(state: &AppState) -> Self {
        Self {
            pool: state.pool.clone(),
            idempotency: IdempotencyRepository::new(state.pool.clone()),
            notifier: state.notifier.clone(),
            audit: AuditLogService::new(state.pool.clone()),
        }
    }

    pub async fn execute(
        &self,
        command: AdjustTransactionCommand,
        idempotency_key: Option<Uuid>,
        context: &OperationContext,
    ) -> Result<AdjustmentOutcome, AppError> {
        let (description, reference) = command.validate()?;
        let admin_id = require_admin(context)?;

        if let Some(key) = idempotency_key {
            let hash = request_hash(&command, &description, reference.as_deref());
            if let IdempotencyOutcome::Replay { status, body } =
                self.idempotency.begin(key, &hash).await?
            {
                tracing::info!(idempotency_key = %key, "Replaying stored adjustment response");
                return Ok(AdjustmentOutcome::Replayed { status, body });
            }
        }

        let applied = match self
            .apply(&command, &description, reference.as_deref(), admin_id)
            .await
        {
            Ok(applied) => applied,
            Err(e) => {
                if let Some(key) = idempotency_key {
                    if let Err(release) = self.idempotency.mark_failed(key).await {
                        tracing::warn!(idempotency_key = %key, error = %release, "Failed to release idempotency key");
                    }
                }
                return Err(e);
            }
        };

        tracing::info!(
            account_id = %command.account_id,
            transaction_id = %applied.transaction_id,
            direction = %command.direction,
            amount = %command.amount,
            balance_after = %applied.balance_after,
            "Manual adjustment applied"
        );

        self.audit
            .record(
                AuditLogBuilder::new(AuditAction::TransactionAdjusted)
                    .resource("account", command.account_id)
                    .before_state(&serde_json::json!({ "balance": applied.balance_before }))
                    .after_state(&serde_json::json!({
                        "balance": applied.balance_after,
                        "transaction_id": applied.transaction_id,
                        "direction": command.direction,
                        "amount": command.amount,
                        "description": description,
                        "reference": reference,
                    }))
                    .changed_fields(&["balance"]),
                context,
            )
            .await;

        let email_sent = match fetch_profile(&self.pool, applied.user_id).await {
            Ok(profile) => {
                self.notifier
                    .notify(
                        &profile.email,
                        EmailTemplate::TransactionAdjusted {
                            first_name: profile.first_name,
                            direction: command.direction,
                            amount: command.amount,
                            masked_number: applied.masked_number.clone(),
                            balance_after: applied.balance_after,
                            description: description.clone(),
                        },
                    )
                    .await
            }
            Err(e) => {
                tracing::warn!(user_id = %applied.user_id, error = %e, "No profile to notify");
                false
            }
        };

        let result = AdjustmentResult {
            transaction_id: applied.transaction_id,
            account_id: command.account_id,
            direction: command.direction,
            amount: command.amount,
            balance_before: applied.balance_before,
            balance_after: applied.balance_after,
            email_sent,
        };

        if let Some(key) = idempotency_key {
            let body = serde_json::to_value(&result)
                .map_err(|e| AppError::Internal(format!("serialize adjustment: {}", e)))?;
            if let Err(e) = self
                .idempotency
                .mark_completed(key, applied.transaction_id, CREATED, &body)
                .await
            {
                tracing::warn!(idempotency_key = %key, error = %e, "Failed to store idempotent response");
            }
        }

        Ok(AdjustmentOutcome::Applied(result))
    }

    async fn apply(
        &self,
        command: &AdjustTransactionCommand,
        description: &str,
        reference: Option<&str>,
        admin_id: Uuid,
    ) -> Result<Applied, AppError> {
        let mut tx = self.pool.begin().await?;

        let account = fetch_account(&mut *tx, command.account_id, Lock::ForUpdate).await?;
        account.status()?.ensure_active()?;

        let balance_before = account.balance;
        let balance_after = command.direction.apply(balance_before, &command.amount)?;

        sqlx::query("UPDATE accounts SET balance = $2, updated_at = NOW() WHERE id = $1")
            .bind(account.id)
            .bind(balance_after)
            .execute(&mut *tx)
            .await?;

        let transaction_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO transactions (
                account_id, user_id, amount, transaction_type, category,
                description, status, balance_after, reference, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, 'completed', $7, $8, $9)
            RETURNING id
            "#,
        )
        .bind(account.id)
        .bind(account.user_id)
        .bind(command.amount.value())
        .bind(command.direction.as_str())
        .bind(CATEGORY_MANUAL_ADJUSTMENT)
        .bind(description)
        .bind(balance_after)
        .bind(reference)
        .bind(admin_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Applied {
            transaction_id,
            user_id: account.user_id,
            masked_number: account.masked_number(),
            balance_before,
            balance_after,
        })
    }
}

/// Hash of the normalized request; a reused key must carry the same body
pub fn request_hash(
    command: &AdjustTransactionCommand,
    description: &str,
    reference: Option<&str>,
) -> String {
    let canonical = serde_json::json!({
        "account_id": command.account_id,
        "amount": command.amount,
        "direction": command.direction,
        "description": description,
        "reference": reference,
    });
    IdempotencyRepository::compute_request_hash(canonical.to_string().as_bytes())
}
