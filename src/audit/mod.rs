//! Audit Log Service
//!
//! Tamper-evident audit logging. The database trigger links each row to
//! the previous one by hash; this service writes entries and verifies the
//! chain.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::OperationContext;

const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Audit log entry as stored
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub sequence_number: i64,
    pub api_key_id: Option<Uuid>,
    pub admin_user_id: Option<Uuid>,
    pub correlation_id: Option<Uuid>,
    pub action: String,
    pub resource_type: Option<String>,
    pub resource_id: Option<Uuid>,
    pub before_state: Option<serde_json::Value>,
    pub after_state: Option<serde_json::Value>,
    pub changed_fields: Option<Vec<String>>,
    pub client_ip: Option<String>,
    pub previous_hash: String,
    pub current_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Audit action types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    ApplicationApproved,
    ApplicationRejected,
    AccountOpened,
    CardIssued,
    CardStatusChanged,
    TransactionAdjusted,
    UserDeleted,
    NotificationSent,
    PermissionDenied,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::ApplicationApproved => "application.approved",
            AuditAction::ApplicationRejected => "application.rejected",
            AuditAction::AccountOpened => "account.opened",
            AuditAction::CardIssued => "card.issued",
            AuditAction::CardStatusChanged => "card.status_changed",
            AuditAction::TransactionAdjusted => "transaction.adjusted",
            AuditAction::UserDeleted => "user.deleted",
            AuditAction::NotificationSent => "notification.sent",
            AuditAction::PermissionDenied => "auth.permission_denied",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Builder for creating audit log entries
#[derive(Debug, Clone)]
pub struct AuditLogBuilder {
    action: AuditAction,
    resource_type: Option<String>,
    resource_id: Option<Uuid>,
    before_state: Option<serde_json::Value>,
    after_state: Option<serde_json::Value>,
    changed_fields: Option<Vec<String>>,
}

impl AuditLogBuilder {
    pub fn new(action: AuditAction) -> Self {
        Self {
            action,
            resource_type: None,
            resource_id: None,
            before_state: None,
            after_state: None,
            changed_fields: None,
        }
    }

    /// Set the resource the action applies to
    pub fn resource(mut self, resource_type: &str, resource_id: Uuid) -> Self {
        self.resource_type = Some(resource_type.to_string());
        self.resource_id = Some(resource_id);
        self
    }

    pub fn before_state<T: Serialize>(mut self, state: &T) -> Self {
        self.before_state = serde_json::to_value(state).ok();
        self
    }

    pub fn after_state<T: Serialize>(mut self, state: &T) -> Self {
        self.after_state = serde_json::to_value(state).ok();
        self
    }

    pub fn changed_fields(mut self, fields: &[&str]) -> Self {
        self.changed_fields = Some(fields.iter().map(|f| f.to_string()).collect());
        self
    }
}

/// Audit Log Service
#[derive(Debug, Clone)]
pub struct AuditLogService {
    pool: PgPool,
}

impl AuditLogService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // Write
    // =========================================================================

    /// Write an audit log entry.
    /// sequence_number, previous_hash and current_hash are set by the trigger.
    pub async fn log(
        &self,
        builder: AuditLogBuilder,
        context: &OperationContext,
    ) -> Result<Uuid, AuditLogError> {
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO audit_logs (
                id, api_key_id, admin_user_id, correlation_id,
                action, resource_type, resource_id,
                before_state, after_state, changed_fields, client_ip,
                sequence_number, previous_hash, current_hash
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11::inet, 0, '', '')
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(context.api_key_id)
        .bind(context.admin_user_id)
        .bind(context.correlation_id)
        .bind(builder.action.as_str())
        .bind(&builder.resource_type)
        .bind(builder.resource_id)
        .bind(&builder.before_state)
        .bind(&builder.after_state)
        .bind(&builder.changed_fields)
        .bind(context.client_ip.map(|ip| ip.to_string()))
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!(audit_id = %id, action = %builder.action, "Audit log entry created");

        Ok(id)
    }

    /// Write an entry, logging instead of failing.
    ///
    /// Used after the audited change has committed; an audit failure must
    /// not turn a completed operation into an error response.
    pub async fn record(&self, builder: AuditLogBuilder, context: &OperationContext) {
        let action = builder.action;
        if let Err(e) = self.log(builder, context).await {
            tracing::warn!(action = %action, error = %e, "Failed to write audit log entry");
        }
    }

    // =========================================================================
    // Verification (hash chain)
    // =========================================================================

    /// Walk the chain in sequence order and recompute every hash
    pub async fn verify_hash_chain(
        &self,
        limit: Option<i64>,
    ) -> Result<ChainVerificationResult, AuditLogError> {
        let limit = limit.unwrap_or(1000);

        // JSON columns are read back as Postgres text so the hash input
        // matches what the trigger saw byte for byte.
        let rows: Vec<ChainRow> = sqlx::query_as(
            r#"
            SELECT id, sequence_number, action, admin_user_id,
                   before_state::text AS before_state,
                   after_state::text AS after_state,
                   previous_hash, current_hash
            FROM audit_logs
            ORDER BY sequence_number ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(verify_rows(&rows))
    }

    /// Most recent entries first
    pub async fn get_recent(&self, limit: i64) -> Result<Vec<AuditLogEntry>, AuditLogError> {
        let entries = sqlx::query_as::<_, AuditLogEntry>(
            r#"
            SELECT id, sequence_number, api_key_id, admin_user_id, correlation_id,
                   action, resource_type, resource_id,
                   before_state, after_state, changed_fields,
                   host(client_ip) AS client_ip, previous_hash, current_hash, created_at
            FROM audit_logs
            ORDER BY sequence_number DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Entries for one resource, most recent first
    pub async fn get_by_resource(
        &self,
        resource_type: &str,
        resource_id: Uuid,
        limit: i64,
    ) -> Result<Vec<AuditLogEntry>, AuditLogError> {
        let entries = sqlx::query_as::<_, AuditLogEntry>(
            r#"
            SELECT id, sequence_number, api_key_id, admin_user_id, correlation_id,
                   action, resource_type, resource_id,
                   before_state, after_state, changed_fields,
                   host(client_ip) AS client_ip, previous_hash, current_hash, created_at
            FROM audit_logs
            WHERE resource_type = $1 AND resource_id = $2
            ORDER BY sequence_number DESC
            LIMIT $3
            "#,
        )
        .bind(resource_type)
        .bind(resource_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }
}

/// Columns that feed the hash
#[derive(Debug, Clone, sqlx::FromRow)]
struct ChainRow {
    id: Uuid,
    sequence_number: i64,
    action: String,
    admin_user_id: Option<Uuid>,
    before_state: Option<String>,
    after_state: Option<String>,
    previous_hash: String,
    current_hash: String,
}

impl ChainRow {
    fn compute_hash(&self) -> String {
        let input = format!(
            "{}{}{}{}{}{}{}",
            self.id,
            self.sequence_number,
            self.action,
            self.admin_user_id.map(|u| u.to_string()).unwrap_or_default(),
            self.before_state.as_deref().unwrap_or_default(),
            self.after_state.as_deref().unwrap_or_default(),
            self.previous_hash
        );
        sha256_hex(&input)
    }
}

fn verify_rows(rows: &[ChainRow]) -> ChainVerificationResult {
    let mut expected_previous = GENESIS_HASH.to_string();

    for (checked, row) in rows.iter().enumerate() {
        if row.previous_hash != expected_previous {
            return ChainVerificationResult::broken(
                checked as u64 + 1,
                row.id,
                expected_previous,
                row.previous_hash.clone(),
            );
        }

        let calculated = row.compute_hash();
        if calculated != row.current_hash {
            return ChainVerificationResult::broken(
                checked as u64 + 1,
                row.id,
                calculated,
                row.current_hash.clone(),
            );
        }

        expected_previous = row.current_hash.clone();
    }

    ChainVerificationResult {
        is_valid: true,
        entries_checked: rows.len() as u64,
        first_invalid_entry: None,
        expected_hash: None,
        actual_hash: None,
    }
}

/// Result of hash chain verification
#[derive(Debug, Clone, Serialize)]
pub struct ChainVerificationResult {
    pub is_valid: bool,
    pub entries_checked: u64,
    pub first_invalid_entry: Option<Uuid>,
    pub expected_hash: Option<String>,
    pub actual_hash: Option<String>,
}

impl ChainVerificationResult {
    fn broken(entries_checked: u64, id: Uuid, expected: String, actual: String) -> Self {
        Self {
            is_valid: false,
            entries_checked,
            first_invalid_entry: Some(id),
            expected_hash: Some(expected),
            actual_hash: Some(actual),
        }
    }
}

fn sha256_hex(input: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Audit log errors
#[derive(Debug, thiserror::Error)]
pub enum AuditLogError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(len: usize) -> Vec<ChainRow> {
        let mut rows = Vec::new();
        let mut previous = GENESIS_HASH.to_string();
        for i in 0..len {
            let mut row = ChainRow {
                id: Uuid::new_v4(),
                sequence_number: i as i64 + 1,
                action: AuditAction::CardIssued.as_str().to_string(),
                admin_user_id: Some(Uuid::new_v4()),
                before_state: None,
                after_state: Some(r#"{"status": "active"}"#.to_string()),
                previous_hash: previous.clone(),
                current_hash: String::new(),
            };
            row.current_hash = row.compute_hash();
            previous = row.current_hash.clone();
            rows.push(row);
        }
        rows
    }

    #[test]
    fn test_audit_action_as_str() {
        assert_eq!(AuditAction::ApplicationApproved.as_str(), "application.approved");
        assert_eq!(AuditAction::TransactionAdjusted.as_str(), "transaction.adjusted");
        assert_eq!(AuditAction::PermissionDenied.as_str(), "auth.permission_denied");
    }

    #[test]
    fn test_audit_log_builder() {
        let id = Uuid::new_v4();
        let builder = AuditLogBuilder::new(AuditAction::CardStatusChanged)
            .resource("card", id)
            .changed_fields(&["status"]);

        assert_eq!(builder.action, AuditAction::CardStatusChanged);
        assert_eq!(builder.resource_type.as_deref(), Some("card"));
        assert_eq!(builder.resource_id, Some(id));
        assert_eq!(builder.changed_fields, Some(vec!["status".to_string()]));
    }

    #[test]
    fn test_valid_chain() {
        let result = verify_rows(&chain(5));
        assert!(result.is_valid);
        assert_eq!(result.entries_checked, 5);
    }

    #[test]
    fn test_empty_chain_is_valid() {
        let result = verify_rows(&[]);
        assert!(result.is_valid);
        assert_eq!(result.entries_checked, 0);
    }

    #[test]
    fn test_tampered_state_detected() {
        let mut rows = chain(4);
        rows[2].after_state = Some(r#"{"status": "cancelled"}"#.to_string());
        let tampered = rows[2].id;

        let result = verify_rows(&rows);
        assert!(!result.is_valid);
        assert_eq!(result.first_invalid_entry, Some(tampered));
        assert_eq!(result.entries_checked, 3);
    }

    #[test]
    fn test_broken_link_detected() {
        let mut rows = chain(3);
        rows.remove(1);

        let result = verify_rows(&rows);
        assert!(!result.is_valid);
        assert_eq!(result.entries_checked, 2);
    }

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
