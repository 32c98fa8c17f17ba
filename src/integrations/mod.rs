//! External service integrations
//!
//! The auth provider and payment provider are reached over HTTP. Both sit
//! behind traits so handlers can run against in-memory fakes in tests.

mod auth_provider;
mod payment_provider;

use std::time::Duration;

use reqwest::{Client, Response, StatusCode};

pub use auth_provider::{AuthProvider, NewAuthUser, SupabaseAuthClient};
pub use payment_provider::{NewCustomer, PaymentProvider, StripePaymentClient};

/// Errors from outbound provider calls
#[derive(Debug, thiserror::Error)]
pub enum IntegrationError {
    #[error("{service} request failed: {source}")]
    Transport {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{service} returned HTTP {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("{service} response could not be decoded: {message}")]
    Decode {
        service: &'static str,
        message: String,
    },
}

impl IntegrationError {
    pub fn service(&self) -> &'static str {
        match self {
            IntegrationError::Transport { service, .. }
            | IntegrationError::Status { service, .. }
            | IntegrationError::Decode { service, .. } => *service,
        }
    }
}

/// HTTP client with the configured timeout
pub(crate) fn http_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Turn a non-2xx response into `IntegrationError::Status`.
///
/// With `allow_not_found`, a 404 counts as success; deletes are idempotent.
pub(crate) async fn check_status(
    service: &'static str,
    response: Response,
    allow_not_found: bool,
) -> Result<Response, IntegrationError> {
    let status = response.status();
    if status.is_success() || (allow_not_found && status == StatusCode::NOT_FOUND) {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    tracing::error!(service, status = %status, body = %body, "Provider returned an error");
    Err(IntegrationError::Status {
        service,
        status: status.as_u16(),
        body,
    })
}
