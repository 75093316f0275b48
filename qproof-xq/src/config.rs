//! Runtime configuration for the extraction-quality service
//!
//! Router parameters resolve in three tiers: compiled defaults, operator
//! settings (settings table, JSON maps for the per-field values), and
//! production config overrides written by promoted fixes.

use qproof_common::{Error, Result};
use rust_decimal::Decimal;
use sqlx::SqlitePool;
use std::collections::HashMap;

use crate::db::{overrides, settings};

/// Confidence router configuration
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Per-field routing weights; unknown fields default to 1.0
    pub field_weights: HashMap<String, f64>,

    /// Per-field minimum-confidence floors (critical fields)
    pub critical_floors: HashMap<String, f64>,

    /// Weighted average at or above this, with low complexity, auto-accepts
    pub auto_accept_threshold: f64,

    /// Weighted average at or above this routes to agent verification
    pub verify_threshold: f64,

    /// Weighted average at or above this routes to agent re-extraction
    pub extract_threshold: f64,

    /// Floor violations with confidence below this escalate all the way to
    /// human review; above it the violation forces agent re-extraction
    pub human_review_bound: f64,

    /// Complexity scores below this bound count as low complexity
    pub low_complexity_bound: f64,

    /// Estimated cost of an agent verification pass
    pub verify_cost: Decimal,

    /// Estimated cost of an agent re-extraction pass
    pub extract_cost: Decimal,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            field_weights: HashMap::new(),
            critical_floors: HashMap::new(),
            auto_accept_threshold: 0.92,
            verify_threshold: 0.80,
            extract_threshold: 0.70,
            human_review_bound: 0.60,
            low_complexity_bound: 0.5,
            // Cents-denominated defaults; refined per deployment
            verify_cost: Decimal::new(35, 2),
            extract_cost: Decimal::new(120, 2),
        }
    }
}

impl RouterConfig {
    /// Field names this configuration knows about, for payload validation
    pub fn known_fields(&self) -> Vec<String> {
        let mut fields: Vec<String> = self
            .field_weights
            .keys()
            .chain(self.critical_floors.keys())
            .cloned()
            .collect();
        fields.sort();
        fields.dedup();
        fields
    }

    /// Per-field low-confidence threshold for pattern detection
    ///
    /// The critical floor when one is configured, the extract threshold
    /// otherwise.
    pub fn low_confidence_threshold(&self, field: &str) -> f64 {
        self.critical_floors
            .get(field)
            .copied()
            .unwrap_or(self.extract_threshold)
    }
}

/// Analyzer and deployment lifecycle parameters
#[derive(Debug, Clone)]
pub struct QualityParameters {
    /// Minimum matching occurrences before a pattern row is created
    pub min_occurrences: i64,

    /// Days after promotion during which a rollback is allowed
    pub rollback_window_days: i64,

    /// Post-promotion monitoring window for automatic rollback
    pub monitoring_window_hours: i64,

    /// Human-review rate above which a promoted fix is rolled back
    pub auto_rollback_error_rate: f64,

    /// Default per-user agent spend cap in cents
    pub default_budget_cap_cents: i64,
}

impl Default for QualityParameters {
    fn default() -> Self {
        Self {
            min_occurrences: 5,
            rollback_window_days: 30,
            monitoring_window_hours: 24,
            auto_rollback_error_rate: 0.20,
            default_budget_cap_cents: 10_000,
        }
    }
}

/// Load router configuration: defaults, settings, production overrides
pub async fn load_router_config(pool: &SqlitePool) -> Result<RouterConfig> {
    let mut config = RouterConfig::default();

    if let Some(json) = settings::get_setting(pool, "field_weights").await? {
        config.field_weights = serde_json::from_str(&json)
            .map_err(|e| Error::Config(format!("Invalid field_weights setting: {}", e)))?;
    }
    if let Some(json) = settings::get_setting(pool, "critical_floors").await? {
        config.critical_floors = serde_json::from_str(&json)
            .map_err(|e| Error::Config(format!("Invalid critical_floors setting: {}", e)))?;
    }

    config.auto_accept_threshold =
        settings::get_f64_setting(pool, "auto_accept_threshold", config.auto_accept_threshold)
            .await?;
    config.verify_threshold =
        settings::get_f64_setting(pool, "verify_threshold", config.verify_threshold).await?;
    config.extract_threshold =
        settings::get_f64_setting(pool, "extract_threshold", config.extract_threshold).await?;
    config.human_review_bound =
        settings::get_f64_setting(pool, "human_review_bound", config.human_review_bound).await?;
    config.low_complexity_bound =
        settings::get_f64_setting(pool, "low_complexity_bound", config.low_complexity_bound)
            .await?;

    // Promoted fixes override individual floors/weights
    for (key, value) in overrides::load_overrides(pool, "PRODUCTION").await? {
        if let Some(field) = key.strip_prefix("critical_floor:") {
            config.critical_floors.insert(field.to_string(), value);
        } else if let Some(field) = key.strip_prefix("field_weight:") {
            config.field_weights.insert(field.to_string(), value);
        }
    }

    Ok(config)
}

/// Load lifecycle parameters from the settings table
pub async fn load_quality_parameters(pool: &SqlitePool) -> Result<QualityParameters> {
    let defaults = QualityParameters::default();
    Ok(QualityParameters {
        min_occurrences: settings::get_i64_setting(pool, "min_occurrences", defaults.min_occurrences)
            .await?,
        rollback_window_days: settings::get_i64_setting(
            pool,
            "rollback_window_days",
            defaults.rollback_window_days,
        )
        .await?,
        monitoring_window_hours: settings::get_i64_setting(
            pool,
            "monitoring_window_hours",
            defaults.monitoring_window_hours,
        )
        .await?,
        auto_rollback_error_rate: settings::get_f64_setting(
            pool,
            "auto_rollback_error_rate",
            defaults.auto_rollback_error_rate,
        )
        .await?,
        default_budget_cap_cents: settings::get_i64_setting(
            pool,
            "default_budget_cap_cents",
            defaults.default_budget_cap_cents,
        )
        .await?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn settings_and_overrides_layer_over_defaults() {
        let pool = crate::db::test_pool().await;

        settings::set_setting(&pool, "field_weights", r#"{"amount":3.0,"vendor":2.0}"#)
            .await
            .unwrap();
        settings::set_setting(&pool, "critical_floors", r#"{"amount":0.70}"#)
            .await
            .unwrap();
        settings::set_setting(&pool, "verify_threshold", "0.82")
            .await
            .unwrap();

        sqlx::query(
            "INSERT INTO config_overrides (environment, key, value, fix_id)
             VALUES ('PRODUCTION', 'critical_floor:amount', 0.78, 'f1'),
                    ('STAGING', 'critical_floor:amount', 0.99, 'f2')",
        )
        .execute(&pool)
        .await
        .unwrap();

        let config = load_router_config(&pool).await.unwrap();
        assert!((config.verify_threshold - 0.82).abs() < 1e-9);
        assert!((config.field_weights["amount"] - 3.0).abs() < 1e-9);
        // Production override wins over the setting; staging is ignored
        assert!((config.critical_floors["amount"] - 0.78).abs() < 1e-9);
        // Untouched values keep their defaults
        assert!((config.auto_accept_threshold - 0.92).abs() < 1e-9);
    }

    #[tokio::test]
    async fn quality_parameters_default_when_unset() {
        let pool = crate::db::test_pool().await;
        let params = load_quality_parameters(&pool).await.unwrap();
        assert_eq!(params.min_occurrences, 5);
        assert_eq!(params.rollback_window_days, 30);
        assert_eq!(params.monitoring_window_hours, 24);
        assert!((params.auto_rollback_error_rate - 0.20).abs() < 1e-9);
    }

    #[test]
    fn per_field_threshold_prefers_critical_floor() {
        let mut config = RouterConfig::default();
        config.critical_floors.insert("amount".to_string(), 0.75);
        assert!((config.low_confidence_threshold("amount") - 0.75).abs() < 1e-9);
        assert!((config.low_confidence_threshold("vendor") - 0.70).abs() < 1e-9);
    }
}
