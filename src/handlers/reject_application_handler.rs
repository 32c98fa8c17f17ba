//! Application Rejection Handler

use sqlx::PgPool;

use crate::audit::{AuditAction, AuditLogBuilder, AuditLogService};
use crate::domain::{ApplicationStatus, OperationContext};
use crate::error::AppError;
use crate::notifications::{EmailTemplate, NotificationService};
use crate::state::AppState;

use super::store::{fetch_application, Lock};
use super::{require_admin, RejectApplicationCommand, RejectionResult};

pub struct RejectApplicationHandler {
    pool: PgPool,
    notifier: NotificationService,
    audit: AuditLogService,
}

impl RejectApplicationHandler {
    pub fn new(state: &AppState) -> Self {
        Self {
            pool: state.pool.clone(),
            notifier: state.notifier.clone(),
            audit: AuditLogService::new(state.pool.clone()),
        }
    }

    pub async fn execute(
        &self,
        command: RejectApplicationCommand,
        context: &OperationContext,
    ) -> Result<RejectionResult, AppError> {
        let reason = command.validate()?;
        let reviewer = require_admin(context)?;

        let mut tx = self.pool.begin().await?;

        let application =
            fetch_application(&mut *tx, command.application_id, Lock::ForUpdate).await?;
        application.status()?.ensure_reviewable()?;

        sqlx::query(
            r#"
            UPDATE applications
            SET status = 'rejected', rejection_reason = $2, reviewed_by = $3,
                reviewed_at = NOW(), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(application.id)
        .bind(&reason)
        .bind(reviewer)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(application_id = %application.id, "Application rejected");

        self.audit
            .record(
                AuditLogBuilder::new(AuditAction::ApplicationRejected)
                    .resource("application", application.id)
                    .before_state(&serde_json::json!({ "status": application.status }))
                    .after_state(&serde_json::json!({
                        "status": ApplicationStatus::Rejected,
                        "rejection_reason": reason,
                    }))
                    .changed_fields(&["status", "rejection_reason", "reviewed_by", "reviewed_at"]),
                context,
            )
            .await;

        let email_sent = self
            .notifier
            .notify(
                &application.email,
                EmailTemplate::ApplicationRejected {
                    first_name: application.first_name.clone(),
                    reason: reason.clone(),
                },
            )
            .await;

        Ok(RejectionResult {
            application_id: application.id,
            status: ApplicationStatus::Rejected.as_str().to_string(),
            reason,
            email_sent,
        })
    }
}
