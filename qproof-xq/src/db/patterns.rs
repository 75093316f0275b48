//! Failure pattern table access
//!
//! Patterns are upserted by signature. Frequency converges monotonically on
//! the outcome-history count via `MAX(frequency, excluded.frequency)`, so
//! concurrent writers never regress the counter and replays change nothing.

use crate::models::{FailurePattern, PatternStatus, PatternType, Severity};
use chrono::{DateTime, Utc};
use qproof_common::{Error, Result};
use sqlx::{Row, SqlitePool};

/// Insert or update a pattern by signature
///
/// `frequency` must be the full outcome-history count for the signature,
/// not a delta. Status and root cause of an existing row are preserved;
/// severity is recomputed upward as frequency grows.
pub async fn upsert_pattern(pool: &SqlitePool, pattern: &FailurePattern) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO failure_patterns
            (signature, pattern_type, field_name, frequency,
             first_seen, last_seen, root_cause, severity, status)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(signature) DO UPDATE SET
            frequency = MAX(frequency, excluded.frequency),
            last_seen = MAX(last_seen, excluded.last_seen),
            severity = excluded.severity
        "#,
    )
    .bind(&pattern.signature)
    .bind(pattern.pattern_type.as_str())
    .bind(&pattern.field_name)
    .bind(pattern.frequency)
    .bind(pattern.first_seen.to_rfc3339())
    .bind(pattern.last_seen.to_rfc3339())
    .bind(&pattern.root_cause)
    .bind(pattern.severity.as_str())
    .bind(pattern.status.as_str())
    .execute(pool)
    .await?;

    Ok(())
}

/// Load a pattern by signature
pub async fn get_pattern(pool: &SqlitePool, signature: &str) -> Result<Option<FailurePattern>> {
    let row = sqlx::query(
        "SELECT signature, pattern_type, field_name, frequency,
                first_seen, last_seen, root_cause, severity, status
         FROM failure_patterns WHERE signature = ?",
    )
    .bind(signature)
    .fetch_optional(pool)
    .await?;

    row.map(pattern_from_row).transpose()
}

/// List all patterns, most frequent first
pub async fn list_patterns(pool: &SqlitePool) -> Result<Vec<FailurePattern>> {
    let rows = sqlx::query(
        "SELECT signature, pattern_type, field_name, frequency,
                first_seen, last_seen, root_cause, severity, status
         FROM failure_patterns ORDER BY frequency DESC, signature",
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(pattern_from_row).collect()
}

/// List patterns in any of the given statuses, most frequent first
pub async fn list_patterns_with_status(
    pool: &SqlitePool,
    statuses: &[PatternStatus],
) -> Result<Vec<FailurePattern>> {
    let all = list_patterns(pool).await?;
    Ok(all
        .into_iter()
        .filter(|p| statuses.contains(&p.status))
        .collect())
}

/// Advance a pattern's status one step forward
///
/// The WHERE clause carries the expected current status, so concurrent
/// advances cannot skip or repeat a step. Advancing an already-advanced
/// pattern is a no-op.
pub async fn advance_status(
    pool: &SqlitePool,
    signature: &str,
    from: PatternStatus,
    to: PatternStatus,
) -> Result<bool> {
    if !from.can_advance_to(to) {
        return Err(Error::InvalidInput(format!(
            "Pattern status cannot advance {} -> {}",
            from.as_str(),
            to.as_str()
        )));
    }

    let result = sqlx::query("UPDATE failure_patterns SET status = ? WHERE signature = ? AND status = ?")
        .bind(to.as_str())
        .bind(signature)
        .bind(from.as_str())
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

pub(crate) fn pattern_from_row(row: sqlx::sqlite::SqliteRow) -> Result<FailurePattern> {
    let pattern_type: String = row.get("pattern_type");
    let pattern_type = parse_pattern_type(&pattern_type)?;

    let severity: String = row.get("severity");
    let severity = parse_severity(&severity)?;

    let status: String = row.get("status");
    let status = parse_status(&status)?;

    Ok(FailurePattern {
        signature: row.get("signature"),
        pattern_type,
        field_name: row.get("field_name"),
        frequency: row.get("frequency"),
        first_seen: parse_timestamp(row.get("first_seen"))?,
        last_seen: parse_timestamp(row.get("last_seen"))?,
        root_cause: row.get("root_cause"),
        severity,
        status,
    })
}

fn parse_pattern_type(s: &str) -> Result<PatternType> {
    match s {
        "OCR_FAILURE" => Ok(PatternType::OcrFailure),
        "NER_MISS" => Ok(PatternType::NerMiss),
        "CALC_ERROR" => Ok(PatternType::CalcError),
        other => Err(Error::Internal(format!("Unknown pattern type: {}", other))),
    }
}

fn parse_severity(s: &str) -> Result<Severity> {
    match s {
        "CRITICAL" => Ok(Severity::Critical),
        "HIGH" => Ok(Severity::High),
        "MEDIUM" => Ok(Severity::Medium),
        "LOW" => Ok(Severity::Low),
        other => Err(Error::Internal(format!("Unknown severity: {}", other))),
    }
}

fn parse_status(s: &str) -> Result<PatternStatus> {
    match s {
        "NEW" => Ok(PatternStatus::New),
        "UNDER_REVIEW" => Ok(PatternStatus::UnderReview),
        "FIX_CREATED" => Ok(PatternStatus::FixCreated),
        "RESOLVED" => Ok(PatternStatus::Resolved),
        other => Err(Error::Internal(format!("Unknown pattern status: {}", other))),
    }
}

fn parse_timestamp(s: String) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(&s)
        .map_err(|e| Error::Internal(format!("Failed to parse timestamp: {}", e)))?
        .with_timezone(&Utc))
}
