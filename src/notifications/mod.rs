//! Notifications module
//!
//! Transactional emails: templates, transports and the best-effort
//! notification service used by the handlers.

mod sender;
mod templates;

use std::sync::Arc;

pub use sender::{EmailError, EmailSender, LoggingEmailSender, OutgoingEmail, SmtpEmailSender};
pub use templates::{escape_html, AccountSummary, EmailTemplate, RenderedEmail};

/// Renders templates and hands them to the configured sender.
///
/// Delivery is best-effort: failures are logged and reported as `false`,
/// never propagated to the operation that triggered the email.
#[derive(Clone)]
pub struct NotificationService {
    sender: Arc<dyn EmailSender>,
}

impl NotificationService {
    pub fn new(sender: Arc<dyn EmailSender>) -> Self {
        Self { sender }
    }

    /// Render and send; returns whether the sender accepted the email
    pub async fn notify(&self, to: &str, template: EmailTemplate) -> bool {
        let name = template.name();
        let rendered = template.render();
        let email = OutgoingEmail {
            to: to.to_string(),
            subject: rendered.subject,
            text: rendered.text,
            html: rendered.html,
        };

        match self.sender.send(&email).await {
            Ok(()) => {
                tracing::info!(template = name, to = %to, "Email sent");
                true
            }
            Err(e) => {
                tracing::warn!(template = name, to = %to, error = %e, "Email delivery failed");
                false
            }
        }
    }
}
