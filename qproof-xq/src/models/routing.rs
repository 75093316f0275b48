//! Routing tiers and decisions

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Action tier for one extraction record
///
/// Ordered worst-to-best: HumanReview < AgentExtract < AgentVerify <
/// AutoAccept. `rank()` exposes that ordering for monotonicity checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoutingTier {
    /// Trust the extraction as-is
    AutoAccept,
    /// Paid agent re-verifies the extracted values
    AgentVerify,
    /// Paid agent re-extracts from the raw text
    AgentExtract,
    /// Hand the record to a human reviewer
    HumanReview,
}

impl RoutingTier {
    /// Tier rank, higher is better
    pub fn rank(&self) -> u8 {
        match self {
            RoutingTier::HumanReview => 0,
            RoutingTier::AgentExtract => 1,
            RoutingTier::AgentVerify => 2,
            RoutingTier::AutoAccept => 3,
        }
    }

    /// String representation matching the wire format
    pub fn as_str(&self) -> &'static str {
        match self {
            RoutingTier::AutoAccept => "AUTO_ACCEPT",
            RoutingTier::AgentVerify => "AGENT_VERIFY",
            RoutingTier::AgentExtract => "AGENT_EXTRACT",
            RoutingTier::HumanReview => "HUMAN_REVIEW",
        }
    }

    /// True for the two paid agent tiers
    pub fn is_agent_tier(&self) -> bool {
        matches!(self, RoutingTier::AgentVerify | RoutingTier::AgentExtract)
    }
}

/// Routing outcome for one extraction record
///
/// Created fresh per record, never mutated. Not persisted on its own; it
/// feeds the pattern analyzer as an input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    /// Selected action tier
    pub tier: RoutingTier,

    /// Weighted confidence score that drove the tier (0.0 - 1.0)
    pub score: f64,

    /// Human-readable reasoning naming the deciding field(s)/signal(s)
    pub reasoning: String,

    /// Estimated handling cost for the tier
    pub estimated_cost: Decimal,
}
