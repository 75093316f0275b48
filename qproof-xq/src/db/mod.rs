//! Database access for the extraction-quality service
//!
//! SQLite via sqlx. Tables are created on startup; the outcome history and
//! deployment log are append-only.

pub mod budgets;
pub mod deployments;
pub mod fixes;
pub mod outcomes;
pub mod overrides;
pub mod patterns;
pub mod settings;

use anyhow::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize database connection pool
///
/// Connects to qproof.db in the data directory, creating it if missing.
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;
    init_tables(&pool).await?;

    Ok(pool)
}

/// Create service tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Per-record processing log, used for monitoring error rates
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS processed_records (
            record_id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            tier TEXT NOT NULL,
            score REAL NOT NULL,
            processed_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Append-only low-confidence outcome history. One row per (record,
    // field) occurrence; INSERT OR IGNORE makes re-analysis idempotent.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS extraction_outcomes (
            record_id TEXT NOT NULL,
            field_name TEXT NOT NULL,
            signature TEXT NOT NULL,
            confidence REAL NOT NULL,
            tier TEXT NOT NULL,
            observed_at TEXT NOT NULL,
            PRIMARY KEY (record_id, field_name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_outcomes_signature
         ON extraction_outcomes (signature, observed_at)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS failure_patterns (
            signature TEXT PRIMARY KEY,
            pattern_type TEXT NOT NULL,
            field_name TEXT NOT NULL,
            frequency INTEGER NOT NULL,
            first_seen TEXT NOT NULL,
            last_seen TEXT NOT NULL,
            root_cause TEXT NOT NULL,
            severity TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'NEW'
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS fix_proposals (
            id TEXT PRIMARY KEY,
            pattern_signature TEXT NOT NULL REFERENCES failure_patterns(signature),
            payload TEXT NOT NULL,
            test_success_rate REAL NOT NULL,
            admin_confidence_score REAL NOT NULL,
            status TEXT NOT NULL DEFAULT 'DRAFT',
            previous_value REAL,
            created_by TEXT NOT NULL,
            created_at TEXT NOT NULL,
            staged_at TEXT,
            promoted_at TEXT,
            rolled_back_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Append-only audit log; no UPDATE/DELETE paths exist
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS deployment_records (
            id TEXT PRIMARY KEY,
            fix_id TEXT NOT NULL REFERENCES fix_proposals(id),
            environment TEXT NOT NULL,
            action TEXT NOT NULL,
            metrics_snapshot TEXT NOT NULL,
            actor TEXT NOT NULL,
            timestamp TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_deployments_fix
         ON deployment_records (fix_id, timestamp)",
    )
    .execute(pool)
    .await?;

    // Scalar routing-config overrides written by staged fixes
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS config_overrides (
            environment TEXT NOT NULL,
            key TEXT NOT NULL,
            value REAL NOT NULL,
            fix_id TEXT NOT NULL,
            PRIMARY KEY (environment, key)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS agent_budgets (
            user_id TEXT PRIMARY KEY,
            cap_cents INTEGER NOT NULL,
            spent_cents INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized");

    Ok(())
}

// Single connection: pooled in-memory SQLite would otherwise give each
// connection its own empty database
#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    init_tables(&pool).await.unwrap();
    pool
}
