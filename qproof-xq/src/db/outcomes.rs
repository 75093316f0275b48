//! Outcome history access
//!
//! The append-only outcome tables anchor pattern frequencies and monitoring
//! metrics. `INSERT OR IGNORE` on the natural key makes re-recording the
//! same outcome a no-op, which is what keeps window re-analysis idempotent.

use chrono::{DateTime, Utc};
use qproof_common::Result;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// One day of a pattern's activity, for trend display
#[derive(Debug, Clone, serde::Serialize)]
pub struct TimelineBucket {
    /// Day in `YYYY-MM-DD` form
    pub day: String,
    pub count: i64,
}

/// Record that a record was processed, for error-rate monitoring
pub async fn record_processed(
    pool: &SqlitePool,
    record_id: Uuid,
    document_id: Uuid,
    tier: &str,
    score: f64,
) -> Result<()> {
    sqlx::query(
        "INSERT OR IGNORE INTO processed_records
         (record_id, document_id, tier, score, processed_at)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(record_id.to_string())
    .bind(document_id.to_string())
    .bind(tier)
    .bind(score)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;
    Ok(())
}

/// Insert one low-confidence field outcome
///
/// Returns true when the row is new; false when this (record, field) pair
/// was already recorded. Callers only bump pattern state for new rows.
pub async fn insert_outcome(
    pool: &SqlitePool,
    record_id: Uuid,
    field_name: &str,
    signature: &str,
    confidence: f64,
    tier: &str,
    observed_at: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query(
        "INSERT OR IGNORE INTO extraction_outcomes
         (record_id, field_name, signature, confidence, tier, observed_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(record_id.to_string())
    .bind(field_name)
    .bind(signature)
    .bind(confidence)
    .bind(tier)
    .bind(observed_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Count all outcomes carrying a signature
pub async fn count_for_signature(pool: &SqlitePool, signature: &str) -> Result<i64> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM extraction_outcomes WHERE signature = ?")
            .bind(signature)
            .fetch_one(pool)
            .await?;
    Ok(count)
}

/// Count outcomes carrying a signature observed at or after a cutoff
pub async fn count_for_signature_since(
    pool: &SqlitePool,
    signature: &str,
    since: DateTime<Utc>,
) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM extraction_outcomes WHERE signature = ? AND observed_at >= ?",
    )
    .bind(signature)
    .bind(since.to_rfc3339())
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// First and last observation timestamps for a signature
pub async fn observation_span(
    pool: &SqlitePool,
    signature: &str,
) -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>> {
    let row = sqlx::query(
        "SELECT MIN(observed_at) AS first_seen, MAX(observed_at) AS last_seen
         FROM extraction_outcomes WHERE signature = ?",
    )
    .bind(signature)
    .fetch_one(pool)
    .await?;

    let first: Option<String> = row.get("first_seen");
    let last: Option<String> = row.get("last_seen");

    match (first, last) {
        (Some(first), Some(last)) => {
            let first = parse_timestamp(&first)?;
            let last = parse_timestamp(&last)?;
            Ok(Some((first, last)))
        }
        _ => Ok(None),
    }
}

/// Frequency-over-time buckets for a signature, grouped by day
pub async fn timeline(pool: &SqlitePool, signature: &str) -> Result<Vec<TimelineBucket>> {
    let rows = sqlx::query(
        "SELECT substr(observed_at, 1, 10) AS day, COUNT(*) AS count
         FROM extraction_outcomes
         WHERE signature = ?
         GROUP BY day
         ORDER BY day",
    )
    .bind(signature)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| TimelineBucket {
            day: row.get("day"),
            count: row.get("count"),
        })
        .collect())
}

/// Share of records routed to human review since a cutoff
///
/// Returns None when no records were processed in the window; callers must
/// not treat an empty window as a healthy one.
pub async fn human_review_rate_since(
    pool: &SqlitePool,
    since: DateTime<Utc>,
) -> Result<Option<f64>> {
    let row = sqlx::query(
        "SELECT
            COUNT(*) AS total,
            SUM(CASE WHEN tier = 'HUMAN_REVIEW' THEN 1 ELSE 0 END) AS reviews
         FROM processed_records
         WHERE processed_at >= ?",
    )
    .bind(since.to_rfc3339())
    .fetch_one(pool)
    .await?;

    let total: i64 = row.get("total");
    if total == 0 {
        return Ok(None);
    }
    let reviews: i64 = row.get::<Option<i64>, _>("reviews").unwrap_or(0);
    Ok(Some(reviews as f64 / total as f64))
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .map_err(|e| qproof_common::Error::Internal(format!("Failed to parse timestamp: {}", e)))?
        .with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn duplicate_outcome_is_ignored() {
        let pool = crate::db::test_pool().await;
        let record_id = Uuid::new_v4();
        let now = Utc::now();

        let first = insert_outcome(
            &pool,
            record_id,
            "amount",
            "amount:0.60-0.70:OCR_FAILURE",
            0.65,
            "AGENT_EXTRACT",
            now,
        )
        .await
        .unwrap();
        assert!(first);

        let second = insert_outcome(
            &pool,
            record_id,
            "amount",
            "amount:0.60-0.70:OCR_FAILURE",
            0.65,
            "AGENT_EXTRACT",
            now,
        )
        .await
        .unwrap();
        assert!(!second, "same (record, field) must not insert twice");

        let count = count_for_signature(&pool, "amount:0.60-0.70:OCR_FAILURE")
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn timeline_buckets_by_day() {
        let pool = crate::db::test_pool().await;
        let sig = "date:0.50-0.60:NER_MISS";

        for i in 0..3 {
            insert_outcome(
                &pool,
                Uuid::new_v4(),
                "date",
                sig,
                0.55,
                "HUMAN_REVIEW",
                Utc::now() - chrono::Duration::days(i % 2),
            )
            .await
            .unwrap();
        }

        let buckets = timeline(&pool, sig).await.unwrap();
        let total: i64 = buckets.iter().map(|b| b.count).sum();
        assert_eq!(total, 3);
        assert!(buckets.len() <= 2);
    }

    #[tokio::test]
    async fn review_rate_empty_window_is_none() {
        let pool = crate::db::test_pool().await;
        let rate = human_review_rate_since(&pool, Utc::now() - chrono::Duration::hours(24))
            .await
            .unwrap();
        assert!(rate.is_none());
    }

    #[tokio::test]
    async fn review_rate_counts_human_review_share() {
        let pool = crate::db::test_pool().await;
        let since = Utc::now() - chrono::Duration::hours(1);

        for tier in ["HUMAN_REVIEW", "AUTO_ACCEPT", "AUTO_ACCEPT", "AGENT_VERIFY"] {
            record_processed(&pool, Uuid::new_v4(), Uuid::new_v4(), tier, 0.8)
                .await
                .unwrap();
        }

        let rate = human_review_rate_since(&pool, since).await.unwrap().unwrap();
        assert!((rate - 0.25).abs() < 1e-9);
    }
}
