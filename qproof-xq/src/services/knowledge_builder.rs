//! Safe Knowledge Builder Service
//!
//! Staged deployment lifecycle for fix proposals:
//! DRAFT -> STAGING -> PRODUCTION -> ROLLED_BACK
//!
//! Transitions run as compare-and-swap updates inside a single transaction
//! together with the configuration mutation and the audit log entry, so a
//! transition either happens completely or not at all, and two concurrent
//! attempts against the same proposal cannot both succeed.

use chrono::{Duration, Utc};
use qproof_common::events::{EventBus, QproofEvent};
use serde::Serialize;
use serde_json::json;
use sqlx::SqlitePool;
use thiserror::Error;
use uuid::Uuid;

use crate::config::{QualityParameters, RouterConfig};
use crate::db::{deployments, fixes, outcomes, overrides};
use crate::models::{
    DeploymentAction, DeploymentEnvironment, DeploymentRecord, FixPayload, FixProposal, FixStatus,
    PatternStatus,
};

/// Minimum offline test success rate to stage a fix
const GATE_MIN_TEST_SUCCESS: f64 = 0.85;

/// Minimum admin confidence score to stage a fix
const GATE_MIN_ADMIN_CONFIDENCE: f64 = 0.80;

/// Knowledge builder errors
///
/// State-machine violations and gate failures surface as typed errors with
/// no partial mutation; the caller sees exactly which condition failed.
#[derive(Debug, Error)]
pub enum KnowledgeError {
    /// Illegal state-machine move
    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// A gate check in can_apply_fix failed; names the check
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// Rollback attempted after the rollback window closed
    #[error("Rollback window expired: {days_since_promotion} days since promotion, window is {window_days} days")]
    WindowExpired {
        days_since_promotion: i64,
        window_days: i64,
    },

    /// Referenced pattern or proposal does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Shared-layer error
    #[error(transparent)]
    Common(#[from] qproof_common::Error),
}

/// One advisory checklist entry for a promotion decision
#[derive(Debug, Clone, Serialize)]
pub struct ChecklistItem {
    pub check: String,
    pub passed: bool,
    pub detail: String,
}

/// Read-only projection of how many records a fix is likely to touch
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentImpact {
    pub pattern_signature: String,
    /// Matching outcomes over the trailing 30 days
    pub recent_frequency: i64,
    /// Derived daily rate
    pub daily_rate: f64,
    /// Projected matches over the next 30 days at the current rate
    pub projected_30_days: i64,
}

/// Safe Knowledge Builder
///
/// Owns fix proposals and the append-only deployment log.
pub struct SafeKnowledgeBuilder {
    db: SqlitePool,
    event_bus: EventBus,
}

impl SafeKnowledgeBuilder {
    pub fn new(db: SqlitePool, event_bus: EventBus) -> Self {
        Self { db, event_bus }
    }

    /// Create a draft proposal tied to an existing failure pattern
    ///
    /// Advances the pattern's triage status towards FIX_CREATED.
    pub async fn propose_fix(
        &self,
        pattern_signature: &str,
        payload: FixPayload,
        test_success_rate: f64,
        admin_confidence_score: f64,
        created_by: &str,
    ) -> Result<FixProposal, KnowledgeError> {
        let pattern = crate::db::patterns::get_pattern(&self.db, pattern_signature)
            .await?
            .ok_or_else(|| {
                KnowledgeError::NotFound(format!("pattern '{}'", pattern_signature))
            })?;

        if !(0.0..=1.0).contains(&test_success_rate) {
            return Err(KnowledgeError::ValidationFailed(format!(
                "test success rate {} outside [0, 1]",
                test_success_rate
            )));
        }
        if !(0.0..=1.0).contains(&admin_confidence_score) {
            return Err(KnowledgeError::ValidationFailed(format!(
                "admin confidence score {} outside [0, 1]",
                admin_confidence_score
            )));
        }

        let fix = FixProposal {
            id: Uuid::new_v4(),
            pattern_signature: pattern.signature.clone(),
            payload,
            test_success_rate,
            admin_confidence_score,
            status: FixStatus::Draft,
            previous_value: None,
            created_by: created_by.to_string(),
            created_at: Utc::now(),
            staged_at: None,
            promoted_at: None,
            rolled_back_at: None,
        };
        fixes::insert_fix(&self.db, &fix).await?;

        // Forward-only; no-ops when the pattern is already further along
        crate::db::patterns::advance_status(
            &self.db,
            pattern_signature,
            PatternStatus::New,
            PatternStatus::UnderReview,
        )
        .await?;
        crate::db::patterns::advance_status(
            &self.db,
            pattern_signature,
            PatternStatus::UnderReview,
            PatternStatus::FixCreated,
        )
        .await?;

        tracing::info!(
            fix_id = %fix.id,
            pattern = %pattern_signature,
            fix_type = fix.payload.fix_type().as_str(),
            "Fix proposal created"
        );

        Ok(fix)
    }

    /// Four-point staging gate; all checks must pass
    ///
    /// Returns the specific failed check as `ValidationFailed`.
    pub async fn can_apply_fix(
        &self,
        fix: &FixProposal,
        config: &RouterConfig,
    ) -> Result<(), KnowledgeError> {
        if fix.test_success_rate < GATE_MIN_TEST_SUCCESS {
            return Err(KnowledgeError::ValidationFailed(format!(
                "test success rate {:.2} below required {:.2}",
                fix.test_success_rate, GATE_MIN_TEST_SUCCESS
            )));
        }
        if fix.admin_confidence_score < GATE_MIN_ADMIN_CONFIDENCE {
            return Err(KnowledgeError::ValidationFailed(format!(
                "admin confidence score {:.2} below required {:.2}",
                fix.admin_confidence_score, GATE_MIN_ADMIN_CONFIDENCE
            )));
        }
        if let Some(other) =
            fixes::find_other_active_for_pattern(&self.db, &fix.pattern_signature, fix.id).await?
        {
            return Err(KnowledgeError::ValidationFailed(format!(
                "pattern '{}' already has active proposal {} ({})",
                fix.pattern_signature,
                other.id,
                other.status.as_str()
            )));
        }
        if let Err(reason) = fix.payload.validate(&config.known_fields()) {
            return Err(KnowledgeError::ValidationFailed(format!(
                "payload invalid for {}: {}",
                fix.payload.fix_type().as_str(),
                reason
            )));
        }
        Ok(())
    }

    /// Advisory promotion checklist: the four gates plus the rollback plan
    ///
    /// Purely informational; the hard gate remains `can_apply_fix`.
    pub async fn create_deployment_checklist(
        &self,
        fix: &FixProposal,
        config: &RouterConfig,
        params: &QualityParameters,
    ) -> Result<Vec<ChecklistItem>, KnowledgeError> {
        let other_active =
            fixes::find_other_active_for_pattern(&self.db, &fix.pattern_signature, fix.id).await?;
        let payload_check = fix.payload.validate(&config.known_fields());

        Ok(vec![
            ChecklistItem {
                check: "test success rate".to_string(),
                passed: fix.test_success_rate >= GATE_MIN_TEST_SUCCESS,
                detail: format!(
                    "{:.2} (required {:.2})",
                    fix.test_success_rate, GATE_MIN_TEST_SUCCESS
                ),
            },
            ChecklistItem {
                check: "admin confidence".to_string(),
                passed: fix.admin_confidence_score >= GATE_MIN_ADMIN_CONFIDENCE,
                detail: format!(
                    "{:.2} (required {:.2})",
                    fix.admin_confidence_score, GATE_MIN_ADMIN_CONFIDENCE
                ),
            },
            ChecklistItem {
                check: "no other active proposal".to_string(),
                passed: other_active.is_none(),
                detail: other_active
                    .map(|o| format!("blocked by {}", o.id))
                    .unwrap_or_else(|| "none active".to_string()),
            },
            ChecklistItem {
                check: "payload structurally valid".to_string(),
                passed: payload_check.is_ok(),
                detail: payload_check.err().unwrap_or_else(|| "valid".to_string()),
            },
            ChecklistItem {
                check: "rollback plan documented".to_string(),
                passed: params.rollback_window_days > 0,
                detail: format!(
                    "automatic revert available for {} days after promotion",
                    params.rollback_window_days
                ),
            },
        ])
    }

    /// Stage a draft fix (DRAFT -> STAGING)
    ///
    /// Gate check, configuration mutation, audit entry and status change
    /// commit as one transaction.
    pub async fn apply_fix(
        &self,
        fix_id: Uuid,
        actor: &str,
        config: &RouterConfig,
    ) -> Result<FixProposal, KnowledgeError> {
        let fix = self.load_fix(fix_id).await?;

        if !fix.status.can_transition_to(FixStatus::Staging) {
            return Err(KnowledgeError::InvalidTransition {
                from: fix.status.as_str().to_string(),
                to: FixStatus::Staging.as_str().to_string(),
            });
        }
        self.can_apply_fix(&fix, config).await?;

        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        // Snapshot the production value the fix will eventually replace, for
        // exact restore on rollback; read under the same transaction as the
        // status change so a concurrent apply cannot slip in between
        let previous_value = match scalar_override_key(&fix.payload) {
            Some(key) => overrides::get_override_tx(&mut tx, "PRODUCTION", &key).await?,
            None => None,
        };

        let updated = sqlx::query(
            "UPDATE fix_proposals
             SET status = 'STAGING', staged_at = ?, previous_value = ?
             WHERE id = ? AND status = 'DRAFT'",
        )
        .bind(now.to_rfc3339())
        .bind(previous_value)
        .bind(fix_id.to_string())
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            // Lost a race; the winning transition already moved the status
            return Err(KnowledgeError::InvalidTransition {
                from: "STAGING".to_string(),
                to: FixStatus::Staging.as_str().to_string(),
            });
        }

        if let Some(key) = scalar_override_key(&fix.payload) {
            sqlx::query(
                "INSERT INTO config_overrides (environment, key, value, fix_id)
                 VALUES ('STAGING', ?, ?, ?)
                 ON CONFLICT(environment, key) DO UPDATE SET
                     value = excluded.value, fix_id = excluded.fix_id",
            )
            .bind(&key)
            .bind(scalar_override_value(&fix.payload))
            .bind(fix_id.to_string())
            .execute(&mut *tx)
            .await?;
        }

        deployments::append_deployment_tx(
            &mut tx,
            fix_id,
            DeploymentEnvironment::Staging,
            DeploymentAction::Apply,
            json!({
                "test_success_rate": fix.test_success_rate,
                "admin_confidence_score": fix.admin_confidence_score,
            }),
            actor,
            now,
        )
        .await?;

        tx.commit().await?;

        tracing::info!(fix_id = %fix_id, actor, "Fix applied to staging");
        self.event_bus.emit_lossy(QproofEvent::FixStaged {
            fix_id,
            pattern_signature: fix.pattern_signature.clone(),
            timestamp: now,
        });

        self.load_fix(fix_id).await
    }

    /// Promote a staged fix to production (STAGING -> PRODUCTION)
    ///
    /// Requires an explicit operator; marks the pattern resolved.
    pub async fn promote_fix(
        &self,
        fix_id: Uuid,
        actor: &str,
    ) -> Result<FixProposal, KnowledgeError> {
        let fix = self.load_fix(fix_id).await?;

        if !fix.status.can_transition_to(FixStatus::Production) {
            return Err(KnowledgeError::InvalidTransition {
                from: fix.status.as_str().to_string(),
                to: FixStatus::Production.as_str().to_string(),
            });
        }

        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        let updated = sqlx::query(
            "UPDATE fix_proposals
             SET status = 'PRODUCTION', promoted_at = ?
             WHERE id = ? AND status = 'STAGING'",
        )
        .bind(now.to_rfc3339())
        .bind(fix_id.to_string())
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(KnowledgeError::InvalidTransition {
                from: "PRODUCTION".to_string(),
                to: FixStatus::Production.as_str().to_string(),
            });
        }

        if let Some(key) = scalar_override_key(&fix.payload) {
            sqlx::query(
                "INSERT INTO config_overrides (environment, key, value, fix_id)
                 VALUES ('PRODUCTION', ?, ?, ?)
                 ON CONFLICT(environment, key) DO UPDATE SET
                     value = excluded.value, fix_id = excluded.fix_id",
            )
            .bind(&key)
            .bind(scalar_override_value(&fix.payload))
            .bind(fix_id.to_string())
            .execute(&mut *tx)
            .await?;

            sqlx::query("DELETE FROM config_overrides WHERE environment = 'STAGING' AND fix_id = ?")
                .bind(fix_id.to_string())
                .execute(&mut *tx)
                .await?;
        }

        deployments::append_deployment_tx(
            &mut tx,
            fix_id,
            DeploymentEnvironment::Production,
            DeploymentAction::Apply,
            json!({
                "test_success_rate": fix.test_success_rate,
                "admin_confidence_score": fix.admin_confidence_score,
            }),
            actor,
            now,
        )
        .await?;

        // Promotion resolves the pattern; guarded so a concurrent change wins
        sqlx::query(
            "UPDATE failure_patterns SET status = 'RESOLVED'
             WHERE signature = ? AND status = 'FIX_CREATED'",
        )
        .bind(&fix.pattern_signature)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(fix_id = %fix_id, actor, "Fix promoted to production");
        self.event_bus.emit_lossy(QproofEvent::FixPromoted {
            fix_id,
            pattern_signature: fix.pattern_signature.clone(),
            timestamp: now,
        });

        self.load_fix(fix_id).await
    }

    /// Roll back a production fix (PRODUCTION -> ROLLED_BACK)
    ///
    /// Permitted only within the rollback window. Restores the snapshotted
    /// pre-fix configuration and reopens the pattern for review, all in one
    /// transaction. `actor` is "system" for automatic rollbacks.
    pub async fn rollback_fix(
        &self,
        fix_id: Uuid,
        actor: &str,
        params: &QualityParameters,
    ) -> Result<FixProposal, KnowledgeError> {
        let fix = self.load_fix(fix_id).await?;

        if !fix.status.can_transition_to(FixStatus::RolledBack) {
            return Err(KnowledgeError::InvalidTransition {
                from: fix.status.as_str().to_string(),
                to: FixStatus::RolledBack.as_str().to_string(),
            });
        }

        let promoted_at = fix.promoted_at.ok_or_else(|| {
            KnowledgeError::ValidationFailed("production fix has no promotion timestamp".to_string())
        })?;
        let days_since = (Utc::now() - promoted_at).num_days();
        if days_since > params.rollback_window_days {
            return Err(KnowledgeError::WindowExpired {
                days_since_promotion: days_since,
                window_days: params.rollback_window_days,
            });
        }

        // Snapshot before opening the transaction; the metrics are advisory
        let review_rate = outcomes::human_review_rate_since(&self.db, promoted_at).await?;

        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        let updated = sqlx::query(
            "UPDATE fix_proposals
             SET status = 'ROLLED_BACK', rolled_back_at = ?
             WHERE id = ? AND status = 'PRODUCTION'",
        )
        .bind(now.to_rfc3339())
        .bind(fix_id.to_string())
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(KnowledgeError::InvalidTransition {
                from: "ROLLED_BACK".to_string(),
                to: FixStatus::RolledBack.as_str().to_string(),
            });
        }

        // Revert the configuration to its exact pre-fix value
        if let Some(key) = scalar_override_key(&fix.payload) {
            match fix.previous_value {
                Some(previous) => {
                    sqlx::query(
                        "UPDATE config_overrides SET value = ?, fix_id = ?
                         WHERE environment = 'PRODUCTION' AND key = ?",
                    )
                    .bind(previous)
                    .bind(fix_id.to_string())
                    .bind(&key)
                    .execute(&mut *tx)
                    .await?;
                }
                None => {
                    sqlx::query(
                        "DELETE FROM config_overrides
                         WHERE environment = 'PRODUCTION' AND key = ?",
                    )
                    .bind(&key)
                    .execute(&mut *tx)
                    .await?;
                }
            }
        }

        deployments::append_deployment_tx(
            &mut tx,
            fix_id,
            DeploymentEnvironment::Production,
            DeploymentAction::Rollback,
            json!({
                "days_since_promotion": days_since,
                "human_review_rate_since_promotion": review_rate,
            }),
            actor,
            now,
        )
        .await?;

        // Resolved reverts to UnderReview; this is the one sanctioned
        // backward move for patterns
        sqlx::query(
            "UPDATE failure_patterns SET status = 'UNDER_REVIEW'
             WHERE signature = ? AND status = 'RESOLVED'",
        )
        .bind(&fix.pattern_signature)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::warn!(fix_id = %fix_id, actor, days_since, "Fix rolled back");
        self.event_bus.emit_lossy(QproofEvent::FixRolledBack {
            fix_id,
            pattern_signature: fix.pattern_signature.clone(),
            actor: actor.to_string(),
            timestamp: now,
        });

        self.load_fix(fix_id).await
    }

    /// Monitor production fixes and roll back degraded ones
    ///
    /// For each production fix, computes the human-review rate since the
    /// later of its promotion and the monitoring-window start. Above the
    /// configured bound, the standard rollback path runs attributed to
    /// "system". Returns the ids that were rolled back.
    pub async fn check_production_health(
        &self,
        params: &QualityParameters,
    ) -> Result<Vec<Uuid>, KnowledgeError> {
        let window_start = Utc::now() - Duration::hours(params.monitoring_window_hours);
        let mut rolled_back = Vec::new();

        for fix in fixes::list_production_fixes(&self.db).await? {
            let Some(promoted_at) = fix.promoted_at else {
                continue;
            };
            let since = promoted_at.max(window_start);
            let Some(rate) = outcomes::human_review_rate_since(&self.db, since).await? else {
                continue; // no traffic, nothing to judge
            };

            if rate > params.auto_rollback_error_rate {
                tracing::warn!(
                    fix_id = %fix.id,
                    rate,
                    bound = params.auto_rollback_error_rate,
                    "Error rate above bound, rolling back automatically"
                );
                self.rollback_fix(fix.id, "system", params).await?;
                rolled_back.push(fix.id);
            }
        }

        Ok(rolled_back)
    }

    /// Estimate how many future records a fix is likely to affect
    ///
    /// Read-only projection from the trailing 30 days of matching outcomes.
    pub async fn get_deployment_impact(
        &self,
        fix_id: Uuid,
    ) -> Result<DeploymentImpact, KnowledgeError> {
        let fix = self.load_fix(fix_id).await?;
        let recent = outcomes::count_for_signature_since(
            &self.db,
            &fix.pattern_signature,
            Utc::now() - Duration::days(30),
        )
        .await?;
        let daily_rate = recent as f64 / 30.0;

        Ok(DeploymentImpact {
            pattern_signature: fix.pattern_signature,
            recent_frequency: recent,
            daily_rate,
            projected_30_days: (daily_rate * 30.0).round() as i64,
        })
    }

    /// Audit trail for a fix, oldest first
    pub async fn deployment_history(
        &self,
        fix_id: Uuid,
    ) -> Result<Vec<DeploymentRecord>, KnowledgeError> {
        Ok(deployments::list_for_fix(&self.db, fix_id).await?)
    }

    async fn load_fix(&self, fix_id: Uuid) -> Result<FixProposal, KnowledgeError> {
        fixes::get_fix(&self.db, fix_id)
            .await?
            .ok_or_else(|| KnowledgeError::NotFound(format!("fix proposal {}", fix_id)))
    }
}

/// Config-override key for scalar payloads; None for record-level payloads
fn scalar_override_key(payload: &FixPayload) -> Option<String> {
    match payload {
        FixPayload::ConfidenceThreshold { field, .. } => Some(overrides::floor_key(field)),
        FixPayload::FieldWeight { field, .. } => Some(overrides::weight_key(field)),
        FixPayload::ExtractionLogic { .. } | FixPayload::ValidationRule { .. } => None,
    }
}

fn scalar_override_value(payload: &FixPayload) -> f64 {
    match payload {
        FixPayload::ConfidenceThreshold { floor, .. } => *floor,
        FixPayload::FieldWeight { weight, .. } => *weight,
        _ => 0.0,
    }
}
