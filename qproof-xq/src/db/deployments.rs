//! Deployment audit log access
//!
//! Append-only: this module exposes insert and read paths only. There is no
//! update or delete anywhere in the codebase (audit retention requirement).

use crate::models::{DeploymentAction, DeploymentEnvironment, DeploymentRecord};
use chrono::DateTime;
use chrono::Utc;
use qproof_common::{Error, Result};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Append one audit entry inside a fix-transition transaction
///
/// Audit entries commit atomically with the status change they document.
pub async fn append_deployment_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    fix_id: Uuid,
    environment: DeploymentEnvironment,
    action: DeploymentAction,
    metrics_snapshot: serde_json::Value,
    actor: &str,
    timestamp: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO deployment_records
         (id, fix_id, environment, action, metrics_snapshot, actor, timestamp)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(fix_id.to_string())
    .bind(environment.as_str())
    .bind(action.as_str())
    .bind(metrics_snapshot.to_string())
    .bind(actor)
    .bind(timestamp.to_rfc3339())
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// All audit entries for a fix, oldest first
pub async fn list_for_fix(pool: &SqlitePool, fix_id: Uuid) -> Result<Vec<DeploymentRecord>> {
    let rows = sqlx::query(
        "SELECT id, fix_id, environment, action, metrics_snapshot, actor, timestamp
         FROM deployment_records WHERE fix_id = ? ORDER BY timestamp",
    )
    .bind(fix_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(record_from_row).collect()
}

fn record_from_row(row: sqlx::sqlite::SqliteRow) -> Result<DeploymentRecord> {
    let id: String = row.get("id");
    let fix_id: String = row.get("fix_id");

    let environment: String = row.get("environment");
    let environment = match environment.as_str() {
        "STAGING" => DeploymentEnvironment::Staging,
        "PRODUCTION" => DeploymentEnvironment::Production,
        other => {
            return Err(Error::Internal(format!(
                "Unknown deployment environment: {}",
                other
            )))
        }
    };

    let action: String = row.get("action");
    let action = match action.as_str() {
        "APPLY" => DeploymentAction::Apply,
        "ROLLBACK" => DeploymentAction::Rollback,
        other => return Err(Error::Internal(format!("Unknown deployment action: {}", other))),
    };

    let metrics: String = row.get("metrics_snapshot");
    let metrics_snapshot = serde_json::from_str(&metrics)
        .map_err(|e| Error::Internal(format!("Failed to parse metrics snapshot: {}", e)))?;

    let timestamp: String = row.get("timestamp");
    let timestamp = DateTime::parse_from_rfc3339(&timestamp)
        .map_err(|e| Error::Internal(format!("Failed to parse timestamp: {}", e)))?
        .with_timezone(&Utc);

    Ok(DeploymentRecord {
        id: Uuid::parse_str(&id)
            .map_err(|e| Error::Internal(format!("Failed to parse deployment id: {}", e)))?,
        fix_id: Uuid::parse_str(&fix_id)
            .map_err(|e| Error::Internal(format!("Failed to parse fix id: {}", e)))?,
        environment,
        action,
        metrics_snapshot,
        actor: row.get("actor"),
        timestamp,
    })
}
