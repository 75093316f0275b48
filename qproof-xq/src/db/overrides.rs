//! Routing-config overrides written by staged fixes
//!
//! Keys are `critical_floor:{field}` and `field_weight:{field}`. The
//! production environment feeds the effective router configuration; staging
//! overrides exist for pre-promotion evaluation only.

use qproof_common::Result;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;

/// Override key for a field's critical confidence floor
pub fn floor_key(field: &str) -> String {
    format!("critical_floor:{}", field)
}

/// Override key for a field's routing weight
pub fn weight_key(field: &str) -> String {
    format!("field_weight:{}", field)
}

/// Current value of an override, if set
pub async fn get_override(
    pool: &SqlitePool,
    environment: &str,
    key: &str,
) -> Result<Option<f64>> {
    let value: Option<f64> = sqlx::query_scalar(
        "SELECT value FROM config_overrides WHERE environment = ? AND key = ?",
    )
    .bind(environment)
    .bind(key)
    .fetch_optional(pool)
    .await?;
    Ok(value)
}

/// Same read on an open transaction's connection
pub async fn get_override_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    environment: &str,
    key: &str,
) -> Result<Option<f64>> {
    let value: Option<f64> = sqlx::query_scalar(
        "SELECT value FROM config_overrides WHERE environment = ? AND key = ?",
    )
    .bind(environment)
    .bind(key)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(value)
}

/// All overrides for an environment, keyed by override key
pub async fn load_overrides(pool: &SqlitePool, environment: &str) -> Result<HashMap<String, f64>> {
    let rows = sqlx::query("SELECT key, value FROM config_overrides WHERE environment = ?")
        .bind(environment)
        .fetch_all(pool)
        .await?;

    Ok(rows
        .into_iter()
        .map(|row| (row.get::<String, _>("key"), row.get::<f64, _>("value")))
        .collect())
}
