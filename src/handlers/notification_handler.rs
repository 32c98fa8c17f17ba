//! Ad-hoc customer email

use sqlx::PgPool;

use crate::audit::{AuditAction, AuditLogBuilder, AuditLogService};
use crate::domain::OperationContext;
use crate::error::AppError;
use crate::notifications::{EmailTemplate, NotificationService};
use crate::state::AppState;

use super::store::fetch_profile;
use super::{require_admin, NotificationResult, SendNotificationCommand};

pub struct SendNotificationHandler {
    pool: PgPool,
    notifier: NotificationService,
    audit: AuditLogService,
}

impl SendNotificationHandler {
    pub fn new(state: &AppState) -> Self {
        Self {
            pool: state.pool.clone(),
            notifier: state.notifier.clone(),
            audit: AuditLogService::new(state.pool.clone()),
        }
    }

    pub async fn execute(
        &self,
        command: SendNotificationCommand,
        context: &OperationContext,
    ) -> Result<NotificationResult, AppError> {
        let (subject, message) = command.validate()?;
        require_admin(context)?;

        let profile = fetch_profile(&self.pool, command.user_id).await?;

        let template = EmailTemplate::Custom {
            first_name: profile.first_name.clone(),
            subject: subject.clone(),
            message,
        };
        let template_name = template.name();
        let email_sent = self.notifier.notify(&profile.email, template).await;

        self.audit
            .record(
                AuditLogBuilder::new(AuditAction::NotificationSent)
                    .resource("user", profile.id)
                    .after_state(&serde_json::json!({
                        "template": template_name,
                        "subject": subject,
                        "email_sent": email_sent,
                    })),
                context,
            )
            .await;

        Ok(NotificationResult {
            user_id: profile.id,
            template: template_name,
            email_sent,
        })
    }
}
