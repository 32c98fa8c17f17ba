//! Error handling module
//!
//! Centralized error types and HTTP response conversion.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::audit::AuditLogError;
use crate::domain::{AmountError, DomainError};
use crate::idempotency::IdempotencyError;
use crate::integrations::IntegrationError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid {header} header")]
    InvalidHeader {
        header: &'static str,
        code: &'static str,
    },

    #[error("Missing X-API-Key header")]
    MissingApiKey,

    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("API key is disabled")]
    ApiKeyDisabled,

    #[error("Permission denied: {0} permission required")]
    PermissionDenied(String),

    #[error("Application not found: {0}")]
    ApplicationNotFound(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Card not found: {0}")]
    CardNotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Idempotency conflict: same key with different request")]
    IdempotencyConflict,

    #[error("Request with this idempotency key is still being processed")]
    IdempotencyInProgress,

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Missing required header: {0}")]
    MissingHeader(String),

    // Domain errors
    #[error(transparent)]
    Domain(#[from] DomainError),

    // Upstream provider errors (502)
    #[error("Upstream provider error: {0}")]
    Upstream(#[from] IntegrationError),

    // Server errors (5xx)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl AppError {
    /// HTTP status, machine-readable code and optional details
    fn parts(&self) -> (StatusCode, &'static str, Option<String>) {
        match self {
            // 400 Bad Request
            AppError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", Some(msg.clone()))
            }
            AppError::MissingHeader(header) => {
                (StatusCode::BAD_REQUEST, "missing_header", Some(header.clone()))
            }
            AppError::InvalidHeader { code, .. } => (StatusCode::BAD_REQUEST, *code, None),

            // 401 Unauthorized
            AppError::MissingApiKey => (StatusCode::UNAUTHORIZED, "missing_api_key", None),
            AppError::InvalidApiKey => (StatusCode::UNAUTHORIZED, "invalid_api_key", None),
            AppError::ApiKeyDisabled => (StatusCode::UNAUTHORIZED, "api_key_disabled", None),

            // 403 Forbidden
            AppError::PermissionDenied(permission) => (
                StatusCode::FORBIDDEN,
                "permission_denied",
                Some(permission.clone()),
            ),

            // 404 Not Found
            AppError::ApplicationNotFound(id) => {
                (StatusCode::NOT_FOUND, "application_not_found", Some(id.clone()))
            }
            AppError::UserNotFound(id) => {
                (StatusCode::NOT_FOUND, "user_not_found", Some(id.clone()))
            }
            AppError::AccountNotFound(id) => {
                (StatusCode::NOT_FOUND, "account_not_found", Some(id.clone()))
            }
            AppError::CardNotFound(id) => {
                (StatusCode::NOT_FOUND, "card_not_found", Some(id.clone()))
            }

            // 409 Conflict
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", Some(msg.clone())),
            AppError::IdempotencyConflict => {
                (StatusCode::CONFLICT, "idempotency_conflict", None)
            }
            AppError::IdempotencyInProgress => {
                (StatusCode::CONFLICT, "idempotency_in_progress", None)
            }

            // 429 Too Many Requests
            AppError::RateLimitExceeded => {
                (StatusCode::TOO_MANY_REQUESTS, "rate_limit_exceeded", None)
            }

            // Domain errors - map to appropriate HTTP status
            AppError::Domain(domain_err) => {
                match domain_err {
                    DomainError::InsufficientFunds { .. } => (
                        StatusCode::UNPROCESSABLE_ENTITY,
                        "insufficient_funds",
                        Some(domain_err.to_string()),
                    ),
                    DomainError::AccountNotActive { status } => (
                        StatusCode::UNPROCESSABLE_ENTITY,
                        "account_not_active",
                        Some(status.clone()),
                    ),
                    DomainError::InvalidAmount(msg) => {
                        (StatusCode::BAD_REQUEST, "invalid_amount", Some(msg.clone()))
                    }
                    DomainError::ApplicationAlreadyReviewed { status } => (
                        StatusCode::CONFLICT,
                        "application_already_reviewed",
                        Some(status.clone()),
                    ),
                    DomainError::InvalidStatusTransition { .. } => (
                        StatusCode::UNPROCESSABLE_ENTITY,
                        "invalid_status_transition",
                        Some(domain_err.to_string()),
                    ),
                    DomainError::UniqueValueExhausted { .. } => {
                        tracing::error!("Unique value generation failed: {}", domain_err);
                        (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
                    }
                    DomainError::BusinessRuleViolation(msg) => (
                        StatusCode::UNPROCESSABLE_ENTITY,
                        "business_rule_violation",
                        Some(msg.clone()),
                    ),
                }
            }

            // 502 Bad Gateway
            AppError::Upstream(e) => {
                tracing::error!("Upstream error: {}", e);
                (StatusCode::BAD_GATEWAY, "upstream_error", Some(e.service().to_string()))
            }

            // 500 Internal Server Error
            AppError::Database(e) => {
                tracing::error!("Database error: {}", describe_database_error(e));
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        }
    }
}

/// Loggable summary of a sqlx error.
///
/// Postgres puts the offending row values in the error detail
/// (`Key (card_number)=(...)`), so only the code, constraint and primary
/// message are kept.
pub(crate) fn describe_database_error(error: &sqlx::Error) -> String {
    match error {
        sqlx::Error::Database(db) => format!(
            "{} (code: {}, constraint: {})",
            db.message(),
            db.code().as_deref().unwrap_or("-"),
            db.constraint().unwrap_or("-"),
        ),
        other => other.to_string(),
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        let text = rejection.body_text();
        match rejection {
            JsonRejection::JsonDataError(_) if AmountError::is_amount_message(&text) => {
                AppError::Domain(DomainError::InvalidAmount(text))
            }
            _ => AppError::InvalidRequest(text),
        }
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::InvalidRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::InvalidRequest(rejection.body_text())
    }
}

impl From<IdempotencyError> for AppError {
    fn from(err: IdempotencyError) -> Self {
        match err {
            IdempotencyError::HashMismatch(_) => AppError::IdempotencyConflict,
            IdempotencyError::KeyInProgress => AppError::IdempotencyInProgress,
            IdempotencyError::Database(e) => AppError::Database(e),
            IdempotencyError::NotFound(key) => {
                AppError::Internal(format!("idempotency key {} vanished", key))
            }
        }
    }
}

impl From<AuditLogError> for AppError {
    fn from(err: AuditLogError) -> Self {
        match err {
            AuditLogError::Database(e) => AppError::Database(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, details) = self.parts();

        // Server-side failures don't leak internals
        let error = if status.is_server_error() && status != StatusCode::BAD_GATEWAY {
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = ErrorResponse {
            error,
            error_code: error_code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn status_and_code(err: AppError) -> (StatusCode, &'static str) {
        let (status, code, _) = err.parts();
        (status, code)
    }

    #[test]
    fn test_domain_error_mapping() {
        assert_eq!(
            status_and_code(DomainError::insufficient_funds(Decimal::TEN, Decimal::ONE).into()),
            (StatusCode::UNPROCESSABLE_ENTITY, "insufficient_funds")
        );
        assert_eq!(
            status_and_code(
                DomainError::ApplicationAlreadyReviewed {
                    status: "approved".to_string()
                }
                .into()
            ),
            (StatusCode::CONFLICT, "application_already_reviewed")
        );
        assert_eq!(
            status_and_code(DomainError::invalid_transition("cancelled", "active").into()),
            (StatusCode::UNPROCESSABLE_ENTITY, "invalid_status_transition")
        );
        assert_eq!(
            status_and_code(
                DomainError::UniqueValueExhausted {
                    kind: "account number",
                    attempts: 10
                }
                .into()
            ),
            (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
        );
    }

    #[test]
    fn test_upstream_maps_to_bad_gateway() {
        let err = AppError::Upstream(IntegrationError::Status {
            service: "auth provider",
            status: 422,
            body: "email exists".to_string(),
        });
        let (status, code, details) = err.parts();
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(code, "upstream_error");
        assert_eq!(details.as_deref(), Some("auth provider"));
    }

    #[test]
    fn test_client_error_codes() {
        assert_eq!(
            status_and_code(AppError::MissingHeader("X-Admin-User-Id".to_string())),
            (StatusCode::BAD_REQUEST, "missing_header")
        );
        assert_eq!(
            status_and_code(AppError::IdempotencyInProgress),
            (StatusCode::CONFLICT, "idempotency_in_progress")
        );
        assert_eq!(
            status_and_code(AppError::CardNotFound("x".to_string())),
            (StatusCode::NOT_FOUND, "card_not_found")
        );
        assert_eq!(
            status_and_code(DomainError::InvalidAmount("-5".to_string()).into()),
            (StatusCode::BAD_REQUEST, "invalid_amount")
        );
    }

    #[test]
    fn test_auth_error_codes() {
        assert_eq!(
            status_and_code(AppError::MissingApiKey),
            (StatusCode::UNAUTHORIZED, "missing_api_key")
        );
        assert_eq!(
            status_and_code(AppError::InvalidApiKey),
            (StatusCode::UNAUTHORIZED, "invalid_api_key")
        );
        assert_eq!(
            status_and_code(AppError::ApiKeyDisabled),
            (StatusCode::UNAUTHORIZED, "api_key_disabled")
        );
        assert_eq!(
            status_and_code(AppError::InvalidHeader {
                header: "X-Admin-User-Id",
                code: "invalid_admin_user_id",
            }),
            (StatusCode::BAD_REQUEST, "invalid_admin_user_id")
        );
        assert_eq!(
            status_and_code(AppError::RateLimitExceeded),
            (StatusCode::TOO_MANY_REQUESTS, "rate_limit_exceeded")
        );

        let (status, code, details) =
            AppError::PermissionDenied("cards:write".to_string()).parts();
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(code, "permission_denied");
        assert_eq!(details.as_deref(), Some("cards:write"));
    }

    /// Unique violation as Postgres reports it, row values in the detail
    #[derive(Debug)]
    struct CardNumberCollision;

    impl std::fmt::Display for CardNumberCollision {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str(
                "duplicate key value violates unique constraint \"cards_card_number_key\" \
                 DETAIL: Key (card_number)=(4000001234567899) already exists.",
            )
        }
    }

    impl std::error::Error for CardNumberCollision {}

    impl sqlx::error::DatabaseError for CardNumberCollision {
        fn message(&self) -> &str {
            "duplicate key value violates unique constraint \"cards_card_number_key\""
        }

        fn code(&self) -> Option<std::borrow::Cow<'_, str>> {
            Some("23505".into())
        }

        fn constraint(&self) -> Option<&str> {
            Some("cards_card_number_key")
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> sqlx::error::ErrorKind {
            sqlx::error::ErrorKind::UniqueViolation
        }
    }

    #[test]
    fn test_database_error_log_line_omits_row_values() {
        let err = sqlx::Error::Database(Box::new(CardNumberCollision));
        let line = describe_database_error(&err);

        assert!(!line.contains("4000001234567899"));
        assert!(line.contains("cards_card_number_key"));
        assert!(line.contains("23505"));
    }

    #[test]
    fn test_idempotency_errors_map_to_conflict() {
        assert_eq!(
            status_and_code(IdempotencyError::HashMismatch(uuid::Uuid::nil()).into()),
            (StatusCode::CONFLICT, "idempotency_conflict")
        );
        assert_eq!(
            status_and_code(IdempotencyError::KeyInProgress.into()),
            (StatusCode::CONFLICT, "idempotency_in_progress")
        );
    }

    #[test]
    fn test_internal_details_hidden() {
        let response = AppError::Internal("pool exhausted".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
