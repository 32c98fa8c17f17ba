//! Database module
//!
//! Database connection and schema checks.

use sqlx::PgPool;

/// Tables the service reads or writes directly
pub const REQUIRED_TABLES: &[&str] = &[
    "api_keys",
    "rate_limit_buckets",
    "idempotency_keys",
    "audit_logs",
    "applications",
    "profiles",
    "accounts",
    "cards",
    "transactions",
];

/// Verify database connectivity
pub async fn verify_connection(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Check if required tables exist
pub async fn check_schema(pool: &PgPool) -> Result<bool, sqlx::Error> {
    for table in REQUIRED_TABLES {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = 'public' AND table_name = $1
            )
            "#,
        )
        .bind(table)
        .fetch_one(pool)
        .await?;

        if !exists {
            tracing::error!("Required table '{}' does not exist", table);
            return Ok(false);
        }
    }

    let has_rate_limit_fn: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM pg_proc WHERE proname = 'check_and_increment_rate_limit')",
    )
    .fetch_one(pool)
    .await?;

    if !has_rate_limit_fn {
        tracing::error!("Function check_and_increment_rate_limit does not exist");
        return Ok(false);
    }

    Ok(true)
}
