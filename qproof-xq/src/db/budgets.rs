//! Per-user agent spend caps
//!
//! Reservation is a single guarded UPDATE, so concurrent requests cannot
//! jointly overspend a cap (no check-then-act window).

use qproof_common::Result;
use sqlx::SqlitePool;

/// Create a budget row for a user if none exists
pub async fn ensure_budget(pool: &SqlitePool, user_id: &str, cap_cents: i64) -> Result<()> {
    sqlx::query(
        "INSERT OR IGNORE INTO agent_budgets (user_id, cap_cents, spent_cents) VALUES (?, ?, 0)",
    )
    .bind(user_id)
    .bind(cap_cents)
    .execute(pool)
    .await?;
    Ok(())
}

/// Atomically reserve spend against a user's cap
///
/// Returns true when the reservation fit under the cap. A user without a
/// budget row has no cap and always succeeds.
pub async fn try_reserve(pool: &SqlitePool, user_id: &str, amount_cents: i64) -> Result<bool> {
    let exists: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM agent_budgets WHERE user_id = ?")
        .bind(user_id)
        .fetch_one(pool)
        .await?;
    if exists == 0 {
        return Ok(true);
    }

    let result = sqlx::query(
        "UPDATE agent_budgets
         SET spent_cents = spent_cents + ?
         WHERE user_id = ? AND spent_cents + ? <= cap_cents",
    )
    .bind(amount_cents)
    .bind(user_id)
    .bind(amount_cents)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Release a reservation that was not consumed (agent call failed)
pub async fn release(pool: &SqlitePool, user_id: &str, amount_cents: i64) -> Result<()> {
    sqlx::query(
        "UPDATE agent_budgets
         SET spent_cents = MAX(0, spent_cents - ?)
         WHERE user_id = ?",
    )
    .bind(amount_cents)
    .bind(user_id)
    .execute(pool)
    .await?;
    Ok(())
}
