//! Composite processing result assembled by the orchestrator

use crate::models::routing::RoutingDecision;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// A production fix that was applied to this record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppliedFix {
    pub fix_id: Uuid,
    pub pattern_signature: String,
    /// What the fix changed for this record, for operator display
    pub description: String,
}

/// Pricing collaborator outcome: a breakdown or a captured warning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PricingOutcome {
    Priced {
        total: Decimal,
        breakdown: BTreeMap<String, Decimal>,
    },
    Unavailable {
        warning: String,
    },
    /// Pricing was not requested for this record
    Skipped,
}

/// Full per-record result: routing plus fix adjustments plus collaborator
/// outcomes. Stage failures surface as warnings; earlier stages' results are
/// always present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeResult {
    pub record_id: Uuid,

    /// Router decision (always present)
    pub routing: RoutingDecision,

    /// Adjusted per-field confidences after production fixes and agent
    /// revision, keyed by field name. Originals live on the record; absent
    /// keys were not adjusted.
    pub adjusted_confidences: BTreeMap<String, f64>,

    /// Production fixes applied to this record
    pub applied_fixes: Vec<AppliedFix>,

    /// Verification-agent cost actually incurred, when an agent ran
    pub agent_cost: Option<Decimal>,

    /// Pricing collaborator outcome
    pub pricing: PricingOutcome,

    /// Operator-facing follow-up recommendations
    pub recommendations: Vec<String>,

    /// Non-fatal stage failures captured during processing
    pub warnings: Vec<String>,
}
