//! API Middleware
//!
//! Request logging, API key authentication and rate limiting.

use std::net::{IpAddr, SocketAddr};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::OperationContext;
use crate::error::AppError;
use crate::state::AppState;

pub const API_KEY_HEADER: &str = "X-API-Key";
pub const CORRELATION_ID_HEADER: &str = "X-Correlation-Id";
pub const FORWARDED_FOR_HEADER: &str = "X-Forwarded-For";

/// Named permissions; `admin` grants all of them
pub mod permissions {
    pub const ADMIN: &str = "admin";
    pub const READ: &str = "read";
    pub const APPLICATIONS_REVIEW: &str = "applications:review";
    pub const ACCOUNTS_WRITE: &str = "accounts:write";
    pub const CARDS_WRITE: &str = "cards:write";
    pub const TRANSACTIONS_ADJUST: &str = "transactions:adjust";
    pub const USERS_DELETE: &str = "users:delete";
    pub const NOTIFICATIONS_SEND: &str = "notifications:send";
    pub const AUDIT_READ: &str = "audit:read";
}

/// API Key authentication result
#[derive(Debug, Clone)]
pub struct AuthenticatedApiKey {
    pub id: Uuid,
    pub name: String,
    pub permissions: Vec<String>,
}

impl AuthenticatedApiKey {
    /// Check if this API key has a specific permission
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions
            .iter()
            .any(|p| p == permission || p == permissions::ADMIN)
    }
}

/// Correlation id assigned by the logging middleware
#[derive(Debug, Clone, Copy)]
pub struct CorrelationId(pub Uuid);

// =========================================================================
// API Key Authentication Middleware
// =========================================================================

/// Validate X-API-Key and build the OperationContext for the request
pub async fn auth_middleware(
    State(pool): State<PgPool>,
    headers: HeaderMap,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let api_key = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::MissingApiKey)?;

    let api_key_record: Option<(Uuid, String, Vec<String>, bool)> = sqlx::query_as(
        r#"
        SELECT id, name, permissions, is_active
        FROM api_keys
        WHERE key_hash = encode(sha256($1::bytea), 'hex')
        "#,
    )
    .bind(api_key.as_bytes())
    .fetch_optional(&pool)
    .await?;

    let (api_key_id, name, permissions, is_active) =
        api_key_record.ok_or(AppError::InvalidApiKey)?;

    if !is_active {
        tracing::warn!(api_key = %name, "Disabled API key used");
        return Err(AppError::ApiKeyDisabled);
    }

    let admin_user_id = parse_admin_user_id(&headers).map_err(|()| AppError::InvalidHeader {
        header: crate::handlers::ADMIN_USER_HEADER,
        code: "invalid_admin_user_id",
    })?;

    let correlation_id = request
        .extensions()
        .get::<CorrelationId>()
        .map(|c| c.0)
        .unwrap_or_else(|| correlation_id_from(&headers));

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    let mut context = OperationContext::for_request(api_key_id, correlation_id)
        .with_client_ip(client_ip(&headers, peer));
    if let Some(admin_id) = admin_user_id {
        context = context.with_admin_user(admin_id);
    }

    tracing::debug!(
        api_key = %name,
        admin_user_id = ?admin_user_id,
        correlation_id = %correlation_id,
        "Request authenticated"
    );

    request.extensions_mut().insert(AuthenticatedApiKey {
        id: api_key_id,
        name,
        permissions,
    });
    request.extensions_mut().insert(context);

    Ok(next.run(request).await)
}

/// `Ok(None)` when absent, `Err` when present but not a UUID
fn parse_admin_user_id(headers: &HeaderMap) -> Result<Option<Uuid>, ()> {
    match headers.get(crate::handlers::ADMIN_USER_HEADER) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|s| Uuid::parse_str(s.trim()).ok())
            .map(Some)
            .ok_or(()),
    }
}

/// Client-supplied correlation id, or a fresh one
pub fn correlation_id_from(headers: &HeaderMap) -> Uuid {
    headers
        .get(CORRELATION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s.trim()).ok())
        .unwrap_or_else(Uuid::new_v4)
}

/// First X-Forwarded-For hop, falling back to the socket peer
pub fn client_ip(headers: &HeaderMap, peer: Option<IpAddr>) -> Option<IpAddr> {
    headers
        .get(FORWARDED_FOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .and_then(|first| first.trim().parse().ok())
        .or(peer)
}

// =========================================================================
// Rate Limiting Middleware
// =========================================================================

/// Per-key, per-minute limit enforced by the database
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let api_key = request
        .extensions()
        .get::<AuthenticatedApiKey>()
        .cloned()
        .ok_or_else(|| AppError::Internal("auth middleware must run first".to_string()))?;

    let allowed: bool = sqlx::query_scalar("SELECT check_and_increment_rate_limit($1, $2)")
        .bind(api_key.id)
        .bind(state.settings.rate_limit_per_minute)
        .fetch_one(&state.pool)
        .await?;

    if !allowed {
        tracing::warn!(api_key = %api_key.name, "Rate limit exceeded");
        return Err(AppError::RateLimitExceeded);
    }

    Ok(next.run(request).await)
}

// =========================================================================
// Header masking
// =========================================================================

/// Headers that should be masked in logs
const SENSITIVE_HEADERS: &[&str] = &["x-api-key", "authorization", "cookie", "set-cookie"];

/// Mask sensitive headers for logging
pub fn mask_headers_for_logging(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let name_lower = name.as_str().to_lowercase();
            let masked_value = if SENSITIVE_HEADERS.contains(&name_lower.as_str()) {
                "[REDACTED]".to_string()
            } else {
                value.to_str().unwrap_or("[invalid utf8]").to_string()
            };
            (name.to_string(), masked_value)
        })
        .collect()
}

// =========================================================================
// Request Logging Middleware
// =========================================================================

/// Logs each request and echoes the correlation id on the response
pub async fn logging_middleware(mut request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let headers = mask_headers_for_logging(request.headers());

    let correlation_id = correlation_id_from(request.headers());
    request.extensions_mut().insert(CorrelationId(correlation_id));

    let start = std::time::Instant::now();

    tracing::info!(
        method = %method,
        uri = %uri,
        correlation_id = %correlation_id,
        headers = ?headers,
        "Incoming request"
    );

    let mut response = next.run(request).await;

    let status = response.status();
    tracing::info!(
        method = %method,
        uri = %uri,
        status = %status,
        duration_ms = %start.elapsed().as_millis(),
        correlation_id = %correlation_id,
        "Request completed"
    );

    if let Ok(value) = HeaderValue::from_str(&correlation_id.to_string()) {
        response.headers_mut().insert(CORRELATION_ID_HEADER, value);
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_headers_for_logging() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", "application/json".parse().unwrap());
        headers.insert("x-api-key", "secret-key-12345".parse().unwrap());
        headers.insert("x-admin-user-id", "staff-1".parse().unwrap());

        let masked = mask_headers_for_logging(&headers);

        let api_key = masked.iter().find(|(k, _)| k == "x-api-key");
        let content_type = masked.iter().find(|(k, _)| k == "content-type");
        let admin = masked.iter().find(|(k, _)| k == "x-admin-user-id");

        assert_eq!(api_key.unwrap().1, "[REDACTED]");
        assert_eq!(content_type.unwrap().1, "application/json");
        assert_eq!(admin.unwrap().1, "staff-1");
    }

    #[test]
    fn test_admin_permission_grants_everything() {
        let key = AuthenticatedApiKey {
            id: Uuid::new_v4(),
            name: "ops".to_string(),
            permissions: vec![permissions::ADMIN.to_string()],
        };
        assert!(key.has_permission(permissions::USERS_DELETE));
        assert!(key.has_permission(permissions::AUDIT_READ));

        let reader = AuthenticatedApiKey {
            permissions: vec![permissions::READ.to_string()],
            ..key
        };
        assert!(reader.has_permission(permissions::READ));
        assert!(!reader.has_permission(permissions::CARDS_WRITE));
    }

    #[test]
    fn test_parse_admin_user_id() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_admin_user_id(&headers), Ok(None));

        let id = Uuid::new_v4();
        headers.insert("x-admin-user-id", id.to_string().parse().unwrap());
        assert_eq!(parse_admin_user_id(&headers), Ok(Some(id)));

        headers.insert("x-admin-user-id", "not-a-uuid".parse().unwrap());
        assert_eq!(parse_admin_user_id(&headers), Err(()));
    }

    #[test]
    fn test_correlation_id_propagated_or_generated() {
        let mut headers = HeaderMap::new();
        let id = Uuid::new_v4();
        headers.insert("x-correlation-id", id.to_string().parse().unwrap());
        assert_eq!(correlation_id_from(&headers), id);

        headers.insert("x-correlation-id", "garbage".parse().unwrap());
        assert_ne!(correlation_id_from(&headers), id);
    }

    #[test]
    fn test_client_ip_prefers_forwarded_for() {
        let peer: IpAddr = "10.0.0.1".parse().unwrap();
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers, Some(peer)), Some(peer));

        headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
        assert_eq!(
            client_ip(&headers, Some(peer)),
            Some("203.0.113.7".parse().unwrap())
        );

        headers.insert("x-forwarded-for", "unknown".parse().unwrap());
        assert_eq!(client_ip(&headers, None), None);
    }
}
