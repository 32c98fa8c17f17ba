//! Shared application state
//!
//! Everything a request handler needs: the pool, provider clients, the
//! notification service and the provisioning settings from config.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::FromRef;
use sqlx::PgPool;

use crate::config::Config;
use crate::integrations::{AuthProvider, PaymentProvider, StripePaymentClient, SupabaseAuthClient};
use crate::notifications::{
    EmailError, EmailSender, LoggingEmailSender, NotificationService, SmtpEmailSender,
};

/// Values used when provisioning accounts, cards and welcome emails
#[derive(Debug, Clone)]
pub struct ProvisioningSettings {
    pub routing_number: String,
    pub card_bin: String,
    pub card_validity_years: u32,
    pub login_url: String,
    pub rate_limit_per_minute: i32,
}

impl ProvisioningSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            routing_number: config.bank_routing_number.clone(),
            card_bin: config.card_bin.clone(),
            card_validity_years: config.card_validity_years,
            login_url: config.app_login_url.clone(),
            rate_limit_per_minute: config.rate_limit_per_minute,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub auth: Arc<dyn AuthProvider>,
    pub payments: Option<Arc<dyn PaymentProvider>>,
    pub notifier: NotificationService,
    pub settings: ProvisioningSettings,
}

impl AppState {
    /// Wire the real provider clients from configuration
    pub fn from_config(pool: PgPool, config: &Config) -> Result<Self, EmailError> {
        let timeout = Duration::from_secs(config.http_timeout_secs);

        let auth: Arc<dyn AuthProvider> = Arc::new(SupabaseAuthClient::new(
            &config.auth_provider_url,
            &config.auth_provider_service_key,
            timeout,
        ));

        let payments = config.payment_api_key.as_deref().map(|key| {
            Arc::new(StripePaymentClient::new(&config.payment_api_url, key, timeout))
                as Arc<dyn PaymentProvider>
        });
        if payments.is_none() {
            tracing::warn!("PAYMENT_API_KEY not set, payment provider integration disabled");
        }

        let sender: Arc<dyn EmailSender> = match &config.smtp {
            Some(smtp) => Arc::new(SmtpEmailSender::new(smtp, &config.email_from)?),
            None => {
                tracing::warn!("SMTP_HOST not set, emails will be logged instead of sent");
                Arc::new(LoggingEmailSender)
            }
        };

        Ok(Self {
            pool,
            auth,
            payments,
            notifier: NotificationService::new(sender),
            settings: ProvisioningSettings::from_config(config),
        })
    }
}

#[cfg(test)]
impl AppState {
    /// State whose pool points at a closed port; for paths that fail before SQL
    pub(crate) fn offline(auth: Arc<dyn AuthProvider>) -> Self {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(200))
            .connect_lazy("postgres://nobody@127.0.0.1:1/none")
            .unwrap();

        Self {
            pool,
            auth,
            payments: None,
            notifier: NotificationService::new(Arc::new(LoggingEmailSender)),
            settings: ProvisioningSettings {
                routing_number: "021000021".to_string(),
                card_bin: "400000".to_string(),
                card_validity_years: 4,
                login_url: "http://localhost:5173/login".to_string(),
                rate_limit_per_minute: 100,
            },
        }
    }
}

impl FromRef<AppState> for PgPool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}
