//! Email transports

use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::SmtpConfig;

/// A fully rendered email addressed to one recipient
#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

/// Email delivery errors
#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("Invalid email address '{address}': {message}")]
    InvalidAddress { address: String, message: String },

    #[error("Failed to build email: {0}")]
    Build(String),

    #[error("SMTP delivery failed: {0}")]
    Transport(String),
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), EmailError>;
}

fn parse_mailbox(address: &str) -> Result<Mailbox, EmailError> {
    address.parse().map_err(|e: lettre::address::AddressError| EmailError::InvalidAddress {
        address: address.to_string(),
        message: e.to_string(),
    })
}

/// Sends through an SMTP relay
pub struct SmtpEmailSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpEmailSender {
    /// Port 465 uses implicit TLS; any other port upgrades with STARTTLS.
    pub fn new(config: &SmtpConfig, from: &str) -> Result<Self, EmailError> {
        let builder = if config.port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
        }
        .map_err(|e| EmailError::Transport(e.to_string()))?
        .port(config.port);

        let builder = match (&config.username, &config.password) {
            (Some(username), Some(password)) => {
                builder.credentials(Credentials::new(username.clone(), password.clone()))
            }
            _ => builder,
        };

        Ok(Self {
            transport: builder.build(),
            from: parse_mailbox(from)?,
        })
    }
}

#[async_trait]
impl EmailSender for SmtpEmailSender {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), EmailError> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(parse_mailbox(&email.to)?)
            .subject(email.subject.clone())
            .multipart(MultiPart::alternative_plain_html(
                email.text.clone(),
                email.html.clone(),
            ))
            .map_err(|e| EmailError::Build(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| EmailError::Transport(e.to_string()))?;

        Ok(())
    }
}

/// Logs instead of sending; used when no SMTP relay is configured
#[derive(Debug, Clone, Default)]
pub struct LoggingEmailSender;

#[async_trait]
impl EmailSender for LoggingEmailSender {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), EmailError> {
        parse_mailbox(&email.to)?;
        // Bodies can carry temporary passwords; only the envelope is logged
        tracing::info!(
            to = %email.to,
            subject = %email.subject,
            "SMTP not configured, email not delivered"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email(to: &str) -> OutgoingEmail {
        OutgoingEmail {
            to: to.to_string(),
            subject: "Hello".to_string(),
            text: "Body".to_string(),
            html: "<p>Body</p>".to_string(),
        }
    }

    #[tokio::test]
    async fn test_logging_sender_accepts_valid_address() {
        assert!(LoggingEmailSender.send(&email("ada@example.com")).await.is_ok());
    }

    #[tokio::test]
    async fn test_logging_sender_rejects_invalid_address() {
        let err = LoggingEmailSender.send(&email("not-an-address")).await.unwrap_err();
        assert!(matches!(err, EmailError::InvalidAddress { .. }));
    }

    #[tokio::test]
    async fn test_smtp_sender_builds_without_connecting() {
        let config = SmtpConfig {
            host: "smtp.example.test".to_string(),
            port: 587,
            username: Some("mailer".to_string()),
            password: Some("secret".to_string()),
        };

        assert!(SmtpEmailSender::new(&config, "Digital Bank <no-reply@bank.local>").is_ok());
        assert!(matches!(
            SmtpEmailSender::new(&config, "no at sign"),
            Err(EmailError::InvalidAddress { .. })
        ));
    }
}
