//! Fix proposal table access
//!
//! Status transitions are performed by the knowledge builder inside
//! transactions with compare-and-swap guards; this module covers reads and
//! the initial insert.

use crate::models::{FixPayload, FixProposal, FixStatus};
use chrono::{DateTime, Utc};
use qproof_common::{Error, Result};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Insert a new draft proposal
pub async fn insert_fix(pool: &SqlitePool, fix: &FixProposal) -> Result<()> {
    let payload = serde_json::to_string(&fix.payload)
        .map_err(|e| Error::Internal(format!("Failed to serialize payload: {}", e)))?;

    sqlx::query(
        r#"
        INSERT INTO fix_proposals
            (id, pattern_signature, payload, test_success_rate,
             admin_confidence_score, status, previous_value,
             created_by, created_at, staged_at, promoted_at, rolled_back_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(fix.id.to_string())
    .bind(&fix.pattern_signature)
    .bind(payload)
    .bind(fix.test_success_rate)
    .bind(fix.admin_confidence_score)
    .bind(fix.status.as_str())
    .bind(fix.previous_value)
    .bind(&fix.created_by)
    .bind(fix.created_at.to_rfc3339())
    .bind(fix.staged_at.map(|t| t.to_rfc3339()))
    .bind(fix.promoted_at.map(|t| t.to_rfc3339()))
    .bind(fix.rolled_back_at.map(|t| t.to_rfc3339()))
    .execute(pool)
    .await?;

    Ok(())
}

/// Load a proposal by id
pub async fn get_fix(pool: &SqlitePool, id: Uuid) -> Result<Option<FixProposal>> {
    let row = sqlx::query("SELECT * FROM fix_proposals WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    row.map(fix_from_row).transpose()
}

/// Find an active (staging or production) proposal for a pattern,
/// excluding the given proposal id
pub async fn find_other_active_for_pattern(
    pool: &SqlitePool,
    pattern_signature: &str,
    exclude_id: Uuid,
) -> Result<Option<FixProposal>> {
    let row = sqlx::query(
        "SELECT * FROM fix_proposals
         WHERE pattern_signature = ?
           AND id != ?
           AND status IN ('STAGING', 'PRODUCTION')
         LIMIT 1",
    )
    .bind(pattern_signature)
    .bind(exclude_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(fix_from_row).transpose()
}

/// List all proposals currently in production
pub async fn list_production_fixes(pool: &SqlitePool) -> Result<Vec<FixProposal>> {
    let rows = sqlx::query(
        "SELECT * FROM fix_proposals WHERE status = 'PRODUCTION' ORDER BY promoted_at",
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(fix_from_row).collect()
}

/// List proposals for a pattern, newest first
pub async fn list_fixes_for_pattern(
    pool: &SqlitePool,
    pattern_signature: &str,
) -> Result<Vec<FixProposal>> {
    let rows = sqlx::query(
        "SELECT * FROM fix_proposals WHERE pattern_signature = ? ORDER BY created_at DESC",
    )
    .bind(pattern_signature)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(fix_from_row).collect()
}

pub(crate) fn fix_from_row(row: sqlx::sqlite::SqliteRow) -> Result<FixProposal> {
    let id: String = row.get("id");
    let id = Uuid::parse_str(&id)
        .map_err(|e| Error::Internal(format!("Failed to parse fix id: {}", e)))?;

    let payload: String = row.get("payload");
    let payload: FixPayload = serde_json::from_str(&payload)
        .map_err(|e| Error::Internal(format!("Failed to deserialize payload: {}", e)))?;

    let status: String = row.get("status");
    let status = FixStatus::parse(&status)
        .ok_or_else(|| Error::Internal(format!("Unknown fix status: {}", status)))?;

    Ok(FixProposal {
        id,
        pattern_signature: row.get("pattern_signature"),
        payload,
        test_success_rate: row.get("test_success_rate"),
        admin_confidence_score: row.get("admin_confidence_score"),
        status,
        previous_value: row.get("previous_value"),
        created_by: row.get("created_by"),
        created_at: parse_timestamp(row.get("created_at"))?,
        staged_at: parse_optional_timestamp(row.get("staged_at"))?,
        promoted_at: parse_optional_timestamp(row.get("promoted_at"))?,
        rolled_back_at: parse_optional_timestamp(row.get("rolled_back_at"))?,
    })
}

fn parse_timestamp(s: String) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(&s)
        .map_err(|e| Error::Internal(format!("Failed to parse timestamp: {}", e)))?
        .with_timezone(&Utc))
}

fn parse_optional_timestamp(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
    s.map(parse_timestamp).transpose()
}
