//! User Deletion Handler
//!
//! Removes a customer and everything they own. Each step stands alone: a
//! failure is logged and recorded in the report, then the walk continues.

use std::sync::Arc;

use sqlx::PgPool;
use uuid::Uuid;

use crate::audit::{AuditAction, AuditLogBuilder, AuditLogService};
use crate::domain::OperationContext;
use crate::error::AppError;
use crate::integrations::{AuthProvider, PaymentProvider};
use crate::notifications::{EmailTemplate, NotificationService};
use crate::state::AppState;

use super::store::fetch_profile;
use super::{require_admin, DeletionReport, ProviderCleanup, TableCleanup};

/// Tables holding customer rows, children before parents
pub const USER_OWNED_TABLES: [&str; 27] = [
    "transaction_disputes",
    "card_transactions",
    "card_controls",
    "cards",
    "scheduled_transfers",
    "transfers",
    "bill_payments",
    "payees",
    "direct_deposits",
    "check_deposits",
    "savings_goals",
    "statements",
    "transactions",
    "accounts",
    "budgets",
    "linked_external_accounts",
    "loan_payments",
    "loans",
    "rewards",
    "notifications",
    "notification_preferences",
    "support_messages",
    "support_tickets",
    "kyc_documents",
    "login_history",
    "user_devices",
    "user_settings",
];

pub struct DeleteUserHandler {
    pool: PgPool,
    auth: Arc<dyn AuthProvider>,
    payments: Option<Arc<dyn PaymentProvider>>,
    notifier: NotificationService,
    audit: AuditLogService,
}

impl DeleteUserHandler {
    pub fn new(state: &AppState) -> Self {
        Self {
            pool: state.pool.clone(),
            auth: state.auth.clone(),
            payments: state.payments.clone(),
            notifier: state.notifier.clone(),
            audit: AuditLogService::new(state.pool.clone()),
        }
    }

    pub async fn execute(
        &self,
        user_id: Uuid,
        context: &OperationContext,
    ) -> Result<DeletionReport, AppError> {
        require_admin(context)?;
        let profile = fetch_profile(&self.pool, user_id).await?;

        let mut report = DeletionReport::new(user_id);

        for table in USER_OWNED_TABLES {
            match self.delete_owned_rows(table, user_id).await {
                Ok(deleted) => report.tables.push(TableCleanup { table, deleted }),
                Err(e) => {
                    tracing::warn!(table, user_id = %user_id, error = %e, "Cleanup step failed");
                    report.record_failure(table, e);
                }
            }
        }

        match sqlx::query("UPDATE applications SET user_id = NULL, updated_at = NOW() WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
        {
            Ok(result) => report.applications_unlinked = result.rows_affected(),
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "Failed to unlink applications");
                report.record_failure("applications", e);
            }
        }

        match sqlx::query("DELETE FROM profiles WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
        {
            Ok(result) => report.profile_deleted = result.rows_affected() > 0,
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "Failed to delete profile");
                report.record_failure("profiles", e);
            }
        }

        report.payment_customer = self
            .delete_payment_customer(profile.payment_customer_id.as_deref())
            .await;

        report.auth_user = match self.auth.delete_user(user_id).await {
            Ok(()) => ProviderCleanup::Deleted,
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "Failed to delete auth user");
                ProviderCleanup::Failed {
                    error: e.to_string(),
                }
            }
        };

        if report.profile_deleted {
            report.email_sent = self
                .notifier
                .notify(
                    &profile.email,
                    EmailTemplate::AccountDeleted {
                        first_name: profile.first_name.clone(),
                    },
                )
                .await;
        }

        if report.is_complete() {
            tracing::info!(
                user_id = %user_id,
                rows_deleted = report.rows_deleted(),
                "User deleted"
            );
        } else {
            tracing::warn!(
                user_id = %user_id,
                rows_deleted = report.rows_deleted(),
                failed_steps = report.failed_steps.len(),
                "User deletion finished with failures"
            );
        }

        self.audit
            .record(
                AuditLogBuilder::new(AuditAction::UserDeleted)
                    .resource("user", user_id)
                    .before_state(&profile)
                    .after_state(&report),
                context,
            )
            .await;

        Ok(report)
    }

    async fn delete_owned_rows(&self, table: &'static str, user_id: Uuid) -> Result<u64, sqlx::Error> {
        // Table names come from the fixed list above, never from input
        let sql = format!("DELETE FROM {} WHERE user_id = $1", table);
        let result = sqlx::query(&sql).bind(user_id).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn delete_payment_customer(&self, customer_id: Option<&str>) -> ProviderCleanup {
        let Some(payments) = &self.payments else {
            return ProviderCleanup::Skipped {
                reason: "payment provider not configured".to_string(),
            };
        };
        let Some(customer_id) = customer_id else {
            return ProviderCleanup::Skipped {
                reason: "no payment customer on profile".to_string(),
            };
        };

        match payments.delete_customer(customer_id).await {
            Ok(()) => ProviderCleanup::Deleted,
            Err(e) => {
                tracing::warn!(customer_id, error = %e, "Failed to delete payment customer");
                ProviderCleanup::Failed {
                    error: e.to_string(),
                }
            }
        }
    }
}
