//! Idempotency Repository
//!
//! Stores the outcome of keyed requests so retries replay the first
//! response instead of applying the change twice.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// A key in `processing` for longer than this is considered abandoned
pub const PROCESSING_TIMEOUT_MINUTES: i64 = 5;

/// Idempotency key status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdempotencyStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl From<String> for IdempotencyStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "processing" => IdempotencyStatus::Processing,
            "completed" => IdempotencyStatus::Completed,
            "failed" => IdempotencyStatus::Failed,
            _ => IdempotencyStatus::Pending,
        }
    }
}

impl std::fmt::Display for IdempotencyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            IdempotencyStatus::Pending => "pending",
            IdempotencyStatus::Processing => "processing",
            IdempotencyStatus::Completed => "completed",
            IdempotencyStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Stored idempotency key
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct IdempotencyKey {
    pub key: Uuid,
    pub request_hash: String,
    pub resource_id: Option<Uuid>,
    pub response_status: Option<i32>,
    pub response_body: Option<serde_json::Value>,
    #[sqlx(rename = "processing_status")]
    pub status: String,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl IdempotencyKey {
    pub fn status(&self) -> IdempotencyStatus {
        IdempotencyStatus::from(self.status.clone())
    }

    /// Still being worked on by another request
    pub fn is_in_flight(&self, now: DateTime<Utc>) -> bool {
        self.status() == IdempotencyStatus::Processing
            && self
                .processing_started_at
                .map(|started| now - started < Duration::minutes(PROCESSING_TIMEOUT_MINUTES))
                .unwrap_or(false)
    }
}

/// What the caller should do with a key
#[derive(Debug, Clone, PartialEq)]
pub enum IdempotencyOutcome {
    /// Key claimed; run the operation and record the result
    Proceed,
    /// Already completed; return the stored response
    Replay {
        status: i32,
        body: serde_json::Value,
    },
}

/// Idempotency Repository Error
#[derive(Debug, thiserror::Error)]
pub enum IdempotencyError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Key is already being processed")]
    KeyInProgress,

    #[error("Request hash mismatch for key {0}")]
    HashMismatch(Uuid),

    #[error("Key not found: {0}")]
    NotFound(Uuid),
}

/// Decide what to do with an existing key for a request with `request_hash`
pub fn evaluate_existing(
    existing: &IdempotencyKey,
    request_hash: &str,
    now: DateTime<Utc>,
) -> Result<Option<IdempotencyOutcome>, IdempotencyError> {
    if existing.request_hash != request_hash {
        return Err(IdempotencyError::HashMismatch(existing.key));
    }

    if existing.status() == IdempotencyStatus::Completed {
        return Ok(Some(IdempotencyOutcome::Replay {
            status: existing.response_status.unwrap_or(200),
            body: existing
                .response_body
                .clone()
                .unwrap_or(serde_json::Value::Null),
        }));
    }

    if existing.is_in_flight(now) {
        return Err(IdempotencyError::KeyInProgress);
    }

    // Failed, pending or abandoned: the caller may retry
    Ok(None)
}

/// Repository for managing idempotency keys
#[derive(Debug, Clone)]
pub struct IdempotencyRepository {
    pool: PgPool,
}

impl IdempotencyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, key: Uuid) -> Result<Option<IdempotencyKey>, IdempotencyError> {
        let row = sqlx::query_as::<_, IdempotencyKey>(
            r#"
            SELECT key, request_hash, resource_id, response_status, response_body,
                   processing_status, processing_started_at, created_at, expires_at
            FROM idempotency_keys
            WHERE key = $1
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Claim a key for processing, or report that the request was already served
    pub async fn begin(
        &self,
        key: Uuid,
        request_hash: &str,
    ) -> Result<IdempotencyOutcome, IdempotencyError> {
        if let Some(existing) = self.get(key).await? {
            if let Some(outcome) = evaluate_existing(&existing, request_hash, Utc::now())? {
                return Ok(outcome);
            }

            // Only one retry wins the reclaim
            let reclaimed = sqlx::query(
                r#"
                UPDATE idempotency_keys
                SET processing_status = 'processing', processing_started_at = NOW()
                WHERE key = $1 AND processing_status = $2
                "#,
            )
            .bind(key)
            .bind(existing.status.as_str())
            .execute(&self.pool)
            .await?
            .rows_affected();

            if reclaimed == 0 {
                return Err(IdempotencyError::KeyInProgress);
            }
            return Ok(IdempotencyOutcome::Proceed);
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO idempotency_keys (key, request_hash, processing_status, processing_started_at)
            VALUES ($1, $2, 'processing', NOW())
            ON CONFLICT (key) DO NOTHING
            "#,
        )
        .bind(key)
        .bind(request_hash)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if inserted == 0 {
            // A concurrent request claimed it between the read and the insert
            return Err(IdempotencyError::KeyInProgress);
        }

        Ok(IdempotencyOutcome::Proceed)
    }

    /// Store the response for replay
    pub async fn mark_completed(
        &self,
        key: Uuid,
        resource_id: Uuid,
        response_status: i32,
        response_body: &serde_json::Value,
    ) -> Result<(), IdempotencyError> {
        let rows = sqlx::query(
            r#"
            UPDATE idempotency_keys
            SET processing_status = 'completed',
                resource_id = $2,
                response_status = $3,
                response_body = $4
            WHERE key = $1
            "#,
        )
        .bind(key)
        .bind(resource_id)
        .bind(response_status)
        .bind(response_body)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if rows == 0 {
            return Err(IdempotencyError::NotFound(key));
        }

        Ok(())
    }

    /// Release the key so the client can retry
    pub async fn mark_failed(&self, key: Uuid) -> Result<(), IdempotencyError> {
        sqlx::query("UPDATE idempotency_keys SET processing_status = 'failed' WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// SHA-256 of the request body for conflict detection
    pub fn compute_request_hash(body: &[u8]) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(body);
        hex::encode(hasher.finalize())
    }
}

// =========================================================================
// Tests
// =========================================================================
