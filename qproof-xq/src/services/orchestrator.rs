//! Extraction Quality Orchestrator
//!
//! Drives one record through the full pipeline: route, record outcomes for
//! pattern detection, apply production fixes, call the verification agent
//! for agent tiers, request pricing. Collaborator failures degrade to
//! warnings on the composite result; routing itself never depends on them.

use qproof_common::events::{EventBus, QproofEvent};
use qproof_common::Result;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::SqlitePool;
use std::collections::BTreeMap;

use crate::config::{self, QualityParameters};
use crate::db::{budgets, fixes, outcomes};
use crate::models::{
    AppliedFix, CompositeResult, ExtractionRecord, FixPayload, FixProposal, PricingOutcome,
    RoutingTier,
};
use crate::services::confidence_router::ConfidenceRouter;
use crate::services::pattern_analyzer::PatternAnalyzer;
use crate::services::pricing_client::PricingClient;
use crate::services::verification_agent::VerificationAgent;

/// Extraction quality orchestrator
///
/// Configuration is reloaded per record so promoted fixes take effect
/// without a restart.
pub struct QualityOrchestrator {
    db: SqlitePool,
    event_bus: EventBus,
    analyzer: PatternAnalyzer,
    agent: VerificationAgent,
    pricing: Option<PricingClient>,
}

impl QualityOrchestrator {
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        agent: VerificationAgent,
        pricing: Option<PricingClient>,
    ) -> Self {
        let analyzer = PatternAnalyzer::new(db.clone(), event_bus.clone());
        Self {
            db,
            event_bus,
            analyzer,
            agent,
            pricing,
        }
    }

    /// Process one extraction record end to end
    pub async fn process(&self, record: &ExtractionRecord) -> Result<CompositeResult> {
        let config = config::load_router_config(&self.db).await?;
        let params = config::load_quality_parameters(&self.db).await?;

        let router = ConfidenceRouter::new(config.clone());
        let routing = router.route(record);

        let mut warnings = Vec::new();
        let mut recommendations = Vec::new();
        let mut adjusted: BTreeMap<String, f64> = BTreeMap::new();
        let mut applied_fixes = Vec::new();

        // History feeds monitoring; losing an entry must not fail the record
        if let Err(e) = outcomes::record_processed(
            &self.db,
            record.record_id,
            record.document_id,
            routing.tier.as_str(),
            routing.score,
        )
        .await
        {
            tracing::warn!(record_id = %record.record_id, error = %e, "Failed to record processing");
            warnings.push(format!("processing history unavailable: {}", e));
        }

        // Pattern detection feeds off every processed record; a failure here
        // must not block the record itself
        match self
            .analyzer
            .record_outcome(record, &routing, &config, &params)
            .await
        {
            Ok(touched) => {
                for pattern in &touched {
                    recommendations.push(format!(
                        "recurring failure pattern {} ({} occurrences); consider a fix proposal",
                        pattern.signature, pattern.frequency
                    ));
                }
            }
            Err(e) => {
                tracing::warn!(record_id = %record.record_id, error = %e, "Pattern analysis failed");
                warnings.push(format!("pattern analysis unavailable: {}", e));
            }
        }

        // Record-level production fixes adjust a copy of the confidences;
        // the stored record is never mutated
        match fixes::list_production_fixes(&self.db).await {
            Ok(production) => {
                for fix in &production {
                    if let Some(applied) = apply_record_fix(fix, record, &mut adjusted) {
                        applied_fixes.push(applied);
                    }
                }
            }
            Err(e) => {
                tracing::warn!(record_id = %record.record_id, error = %e, "Fix lookup failed");
                warnings.push(format!("production fixes unavailable: {}", e));
            }
        }

        let mut agent_cost = None;
        if routing.tier.is_agent_tier() {
            agent_cost = self
                .run_agent_stage(
                    record,
                    routing.tier,
                    routing.estimated_cost,
                    &params,
                    &mut adjusted,
                    &mut warnings,
                    &mut recommendations,
                )
                .await;
        }

        let pricing = self.run_pricing_stage(record, routing.tier).await;
        if let PricingOutcome::Unavailable { warning } = &pricing {
            warnings.push(warning.clone());
        }

        if routing.tier == RoutingTier::HumanReview {
            recommendations.push("queue for human review".to_string());
        }

        self.event_bus.emit_lossy(QproofEvent::RecordProcessed {
            record_id: record.record_id,
            tier: routing.tier.as_str().to_string(),
            score: routing.score,
            timestamp: chrono::Utc::now(),
        });
        tracing::info!(
            record_id = %record.record_id,
            tier = routing.tier.as_str(),
            score = routing.score,
            warnings = warnings.len(),
            "Record processed"
        );

        Ok(CompositeResult {
            record_id: record.record_id,
            routing,
            adjusted_confidences: adjusted,
            applied_fixes,
            agent_cost,
            pricing,
            recommendations,
            warnings,
        })
    }

    /// Agent stage: reserve budget, call the agent, merge revisions
    ///
    /// Returns the cost actually incurred. A failed call releases the
    /// reservation so the budget only reflects completed work. All failures,
    /// budget bookkeeping included, degrade to warnings.
    #[allow(clippy::too_many_arguments)]
    async fn run_agent_stage(
        &self,
        record: &ExtractionRecord,
        tier: RoutingTier,
        estimated_cost: Decimal,
        params: &QualityParameters,
        adjusted: &mut BTreeMap<String, f64>,
        warnings: &mut Vec<String>,
        recommendations: &mut Vec<String>,
    ) -> Option<Decimal> {
        let cost_cents = (estimated_cost * Decimal::from(100))
            .to_i64()
            .unwrap_or(0)
            .max(0);

        let mut reserved_user = None;
        if let Some(user_id) = &record.user_id {
            match self.reserve_budget(user_id, cost_cents, params).await {
                Ok(true) => reserved_user = Some(user_id.clone()),
                Ok(false) => {
                    warnings.push(format!(
                        "agent budget exhausted for user {}; skipping agent call",
                        user_id
                    ));
                    recommendations.push("queue for human review".to_string());
                    return None;
                }
                Err(e) => {
                    // Cap cannot be enforced, so no spend happens either
                    tracing::warn!(record_id = %record.record_id, error = %e, "Budget check failed");
                    warnings.push(format!(
                        "agent budget check unavailable: {}; skipping agent call",
                        e
                    ));
                    recommendations.push("queue for human review".to_string());
                    return None;
                }
            }
        }

        match self.agent.verify(record, tier).await {
            Ok(verification) => {
                for (field, revised) in verification.revised_fields {
                    adjusted.insert(field, revised.confidence.clamp(0.0, 1.0));
                }
                if let Some(notes) = verification.notes {
                    recommendations.push(format!("agent notes: {}", notes));
                }
                Some(estimated_cost)
            }
            Err(e) => {
                if let Some(user_id) = reserved_user {
                    if let Err(release_err) = budgets::release(&self.db, &user_id, cost_cents).await
                    {
                        tracing::warn!(user_id = %user_id, error = %release_err, "Budget release failed");
                        warnings.push(format!("agent budget release failed: {}", release_err));
                    }
                }
                tracing::warn!(record_id = %record.record_id, error = %e, "Agent call failed");
                warnings.push(format!("verification agent failed: {}", e));
                recommendations.push("queue for human review".to_string());
                None
            }
        }
    }

    async fn reserve_budget(
        &self,
        user_id: &str,
        cost_cents: i64,
        params: &QualityParameters,
    ) -> Result<bool> {
        budgets::ensure_budget(&self.db, user_id, params.default_budget_cap_cents).await?;
        budgets::try_reserve(&self.db, user_id, cost_cents).await
    }

    /// Pricing stage: advisory, failures become a captured warning
    async fn run_pricing_stage(
        &self,
        record: &ExtractionRecord,
        tier: RoutingTier,
    ) -> PricingOutcome {
        // Records bound for human review are priced after review, not here
        if tier == RoutingTier::HumanReview {
            return PricingOutcome::Skipped;
        }
        let Some(pricing) = &self.pricing else {
            return PricingOutcome::Skipped;
        };

        match pricing.quote(record).await {
            Ok(quote) => PricingOutcome::Priced {
                total: quote.total,
                breakdown: quote.breakdown,
            },
            Err(e) => PricingOutcome::Unavailable {
                warning: format!("pricing unavailable: {}", e),
            },
        }
    }
}

/// Apply one production fix to a record, non-destructively
///
/// Scalar fixes (floors, weights) act through the loaded configuration and
/// are not repeated here. Record-level fixes adjust the confidence copy.
fn apply_record_fix(
    fix: &FixProposal,
    record: &ExtractionRecord,
    adjusted: &mut BTreeMap<String, f64>,
) -> Option<AppliedFix> {
    match &fix.payload {
        FixPayload::ExtractionLogic {
            field,
            normalizer,
            confidence_scale,
        } => {
            let extracted = record.fields.get(field)?;
            let base = adjusted
                .get(field)
                .copied()
                .unwrap_or(extracted.confidence);
            adjusted.insert(field.clone(), (base * confidence_scale).clamp(0.0, 1.0));
            Some(AppliedFix {
                fix_id: fix.id,
                pattern_signature: fix.pattern_signature.clone(),
                description: format!(
                    "applied '{}' normalizer to field '{}' (confidence scale {:.2})",
                    normalizer, field, confidence_scale
                ),
            })
        }
        FixPayload::ValidationRule { field, min, max } => {
            let extracted = record.fields.get(field)?;
            let value: f64 = extracted.value.parse().ok()?;
            if value < *min || value > *max {
                // Out-of-range values lose confidence rather than being edited
                adjusted.insert(field.clone(), 0.0);
                Some(AppliedFix {
                    fix_id: fix.id,
                    pattern_signature: fix.pattern_signature.clone(),
                    description: format!(
                        "field '{}' value {} outside [{}, {}]",
                        field, value, min, max
                    ),
                })
            } else {
                None
            }
        }
        FixPayload::ConfidenceThreshold { .. } | FixPayload::FieldWeight { .. } => None,
    }
}
