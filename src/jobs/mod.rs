//! Scheduled Jobs
//!
//! Periodic maintenance: expired rate-limit windows and idempotency keys.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

use crate::idempotency::PROCESSING_TIMEOUT_MINUTES;

// =========================================================================
// Rate limit bucket cleanup
// =========================================================================

/// Remove rate limit windows older than two minutes
pub async fn cleanup_rate_limit_buckets(pool: &PgPool) -> Result<u64, JobError> {
    let rows_deleted = sqlx::query(
        r#"
        DELETE FROM rate_limit_buckets
        WHERE window_start < NOW() - INTERVAL '2 minutes'
        "#,
    )
    .execute(pool)
    .await?
    .rows_affected();

    if rows_deleted > 0 {
        tracing::info!(rows_deleted, "Cleaned up expired rate limit buckets");
    }

    Ok(rows_deleted)
}

// =========================================================================
// Idempotency maintenance
// =========================================================================

/// Mark keys stuck in 'processing' as failed so clients can retry
pub async fn reset_stale_idempotency_keys(pool: &PgPool) -> Result<u64, JobError> {
    let rows_affected = sqlx::query(
        r#"
        UPDATE idempotency_keys
        SET processing_status = 'failed'
        WHERE processing_status = 'processing'
          AND processing_started_at < NOW() - make_interval(mins => $1)
        "#,
    )
    .bind(PROCESSING_TIMEOUT_MINUTES as i32)
    .execute(pool)
    .await?
    .rows_affected();

    if rows_affected > 0 {
        tracing::warn!(rows_affected, "Reset stale processing idempotency keys");
    }

    Ok(rows_affected)
}

/// Delete keys past their expiry
pub async fn delete_expired_idempotency_keys(pool: &PgPool) -> Result<u64, JobError> {
    let rows_deleted = sqlx::query("DELETE FROM idempotency_keys WHERE expires_at < NOW()")
        .execute(pool)
        .await?
        .rows_affected();

    if rows_deleted > 0 {
        tracing::info!(rows_deleted, "Deleted expired idempotency keys");
    }

    Ok(rows_deleted)
}

// =========================================================================
// Job Scheduler
// =========================================================================

/// Runs the maintenance jobs on a fixed interval
pub struct JobScheduler {
    pool: PgPool,
    every: Duration,
}

impl JobScheduler {
    pub fn new(pool: PgPool, every: Duration) -> Self {
        Self { pool, every }
    }

    /// Start in the background; abort the handle to stop
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        tracing::info!(interval_secs = self.every.as_secs(), "Job scheduler started");

        let mut ticker = interval(self.every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let report = self.run_all_once().await;
            for error in &report.errors {
                tracing::error!(error = %error, "Maintenance job failed");
            }
        }
    }

    /// Run every job once, collecting failures instead of stopping
    pub async fn run_all_once(&self) -> MaintenanceReport {
        let mut report = MaintenanceReport::default();

        match cleanup_rate_limit_buckets(&self.pool).await {
            Ok(count) => report.rate_limit_buckets_cleaned = count,
            Err(e) => report.errors.push(format!("Rate limit cleanup: {}", e)),
        }

        match reset_stale_idempotency_keys(&self.pool).await {
            Ok(count) => report.idempotency_keys_reset = count,
            Err(e) => report.errors.push(format!("Idempotency reset: {}", e)),
        }

        match delete_expired_idempotency_keys(&self.pool).await {
            Ok(count) => report.idempotency_keys_deleted = count,
            Err(e) => report.errors.push(format!("Idempotency deletion: {}", e)),
        }

        report.completed_at = Utc::now();
        report
    }
}

/// Report from running maintenance jobs
#[derive(Debug, Clone, Default)]
pub struct MaintenanceReport {
    pub rate_limit_buckets_cleaned: u64,
    pub idempotency_keys_reset: u64,
    pub idempotency_keys_deleted: u64,
    pub errors: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

/// Job execution errors
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::PgPoolOptions;

    #[test]
    fn test_maintenance_report_default() {
        let report = MaintenanceReport::default();
        assert_eq!(report.rate_limit_buckets_cleaned, 0);
        assert_eq!(report.idempotency_keys_reset, 0);
        assert!(report.errors.is_empty());
    }

    #[tokio::test]
    async fn test_run_all_once_collects_errors() {
        // Nothing listens on port 1; every job fails to connect
        let pool = PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(200))
            .connect_lazy("postgres://nobody@127.0.0.1:1/none")
            .unwrap();

        let report = JobScheduler::new(pool, Duration::from_secs(60))
            .run_all_once()
            .await;

        assert_eq!(report.errors.len(), 3);
        assert_eq!(report.idempotency_keys_deleted, 0);
    }
}
