//! Fix proposals and their staged-deployment state machine
//!
//! A proposal carries a typed configuration diff tied to a failure pattern.
//! Status moves through an explicit transition table: Draft -> Staging ->
//! Production -> RolledBack. Anything not in the table is rejected.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fix category, matching the payload variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FixType {
    ConfidenceThreshold,
    FieldWeight,
    ExtractionLogic,
    ValidationRule,
}

impl FixType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FixType::ConfidenceThreshold => "CONFIDENCE_THRESHOLD",
            FixType::FieldWeight => "FIELD_WEIGHT",
            FixType::ExtractionLogic => "EXTRACTION_LOGIC",
            FixType::ValidationRule => "VALIDATION_RULE",
        }
    }
}

/// Typed configuration diff, one variant per fix type
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "fix_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FixPayload {
    /// Adjust the critical-floor for a field
    ConfidenceThreshold { field: String, floor: f64 },

    /// Adjust the routing weight for a field
    FieldWeight { field: String, weight: f64 },

    /// Recalibrate a field's extractor confidence by a named normalizer
    ExtractionLogic {
        field: String,
        normalizer: String,
        confidence_scale: f64,
    },

    /// Bound a numeric field's plausible value range
    ValidationRule { field: String, min: f64, max: f64 },
}

impl FixPayload {
    /// Fix type tag for this payload
    pub fn fix_type(&self) -> FixType {
        match self {
            FixPayload::ConfidenceThreshold { .. } => FixType::ConfidenceThreshold,
            FixPayload::FieldWeight { .. } => FixType::FieldWeight,
            FixPayload::ExtractionLogic { .. } => FixType::ExtractionLogic,
            FixPayload::ValidationRule { .. } => FixType::ValidationRule,
        }
    }

    /// Field this payload targets
    pub fn field(&self) -> &str {
        match self {
            FixPayload::ConfidenceThreshold { field, .. }
            | FixPayload::FieldWeight { field, .. }
            | FixPayload::ExtractionLogic { field, .. }
            | FixPayload::ValidationRule { field, .. } => field,
        }
    }

    /// Structural validation, dispatched per fix type
    ///
    /// `known_fields` is the set of fields the router configuration knows
    /// about; payloads naming an unknown field are rejected.
    pub fn validate(&self, known_fields: &[String]) -> Result<(), String> {
        let field = self.field();
        if field.trim().is_empty() {
            return Err("payload names an empty field".to_string());
        }
        if !known_fields.iter().any(|f| f == field) {
            return Err(format!("payload names unknown field '{}'", field));
        }

        match self {
            FixPayload::ConfidenceThreshold { floor, .. } => {
                if !(0.0..=1.0).contains(floor) {
                    return Err(format!("confidence floor {} outside [0, 1]", floor));
                }
            }
            FixPayload::FieldWeight { weight, .. } => {
                if *weight < 0.0 || !weight.is_finite() {
                    return Err(format!("field weight {} must be finite and >= 0", weight));
                }
            }
            FixPayload::ExtractionLogic {
                normalizer,
                confidence_scale,
                ..
            } => {
                if normalizer.trim().is_empty() {
                    return Err("extraction logic names no normalizer".to_string());
                }
                if !(0.0..=2.0).contains(confidence_scale) {
                    return Err(format!(
                        "confidence scale {} outside [0, 2]",
                        confidence_scale
                    ));
                }
            }
            FixPayload::ValidationRule { min, max, .. } => {
                if min > max {
                    return Err(format!("validation range [{}, {}] is inverted", min, max));
                }
            }
        }

        Ok(())
    }
}

/// Deployment status of a fix proposal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FixStatus {
    Draft,
    Staging,
    Production,
    RolledBack,
}

/// Allowed status transitions; everything else is illegal
const TRANSITIONS: &[(FixStatus, FixStatus)] = &[
    (FixStatus::Draft, FixStatus::Staging),
    (FixStatus::Staging, FixStatus::Production),
    (FixStatus::Production, FixStatus::RolledBack),
];

impl FixStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FixStatus::Draft => "DRAFT",
            FixStatus::Staging => "STAGING",
            FixStatus::Production => "PRODUCTION",
            FixStatus::RolledBack => "ROLLED_BACK",
        }
    }

    pub fn parse(s: &str) -> Option<FixStatus> {
        match s {
            "DRAFT" => Some(FixStatus::Draft),
            "STAGING" => Some(FixStatus::Staging),
            "PRODUCTION" => Some(FixStatus::Production),
            "ROLLED_BACK" => Some(FixStatus::RolledBack),
            _ => None,
        }
    }

    /// Transition-table lookup
    pub fn can_transition_to(&self, next: FixStatus) -> bool {
        TRANSITIONS.contains(&(*self, next))
    }

    /// Active statuses block other proposals for the same pattern
    pub fn is_active(&self) -> bool {
        matches!(self, FixStatus::Staging | FixStatus::Production)
    }
}

/// A proposed, testable change to extraction/confidence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixProposal {
    pub id: Uuid,

    /// Signature of the failure pattern this fix addresses
    pub pattern_signature: String,

    /// Typed configuration diff
    pub payload: FixPayload,

    /// Offline test success rate for the fix (0.0 - 1.0)
    pub test_success_rate: f64,

    /// Reviewing admin's confidence in the fix (0.0 - 1.0)
    pub admin_confidence_score: f64,

    /// Deployment status
    pub status: FixStatus,

    /// Pre-fix configuration value, snapshotted at apply time for exact
    /// restore on rollback. None when the fix introduced a fresh override.
    pub previous_value: Option<f64>,

    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub staged_at: Option<DateTime<Utc>>,
    pub promoted_at: Option<DateTime<Utc>>,
    pub rolled_back_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_table_allows_only_the_staged_path() {
        assert!(FixStatus::Draft.can_transition_to(FixStatus::Staging));
        assert!(FixStatus::Staging.can_transition_to(FixStatus::Production));
        assert!(FixStatus::Production.can_transition_to(FixStatus::RolledBack));

        // Skipping staging is illegal
        assert!(!FixStatus::Draft.can_transition_to(FixStatus::Production));
        // All backward moves are illegal
        assert!(!FixStatus::Staging.can_transition_to(FixStatus::Draft));
        assert!(!FixStatus::Production.can_transition_to(FixStatus::Staging));
        assert!(!FixStatus::RolledBack.can_transition_to(FixStatus::Production));
        // Terminal state stays terminal
        assert!(!FixStatus::RolledBack.can_transition_to(FixStatus::Staging));
    }

    #[test]
    fn threshold_payload_validation() {
        let known = vec!["amount".to_string(), "vendor".to_string()];

        let valid = FixPayload::ConfidenceThreshold {
            field: "amount".to_string(),
            floor: 0.75,
        };
        assert!(valid.validate(&known).is_ok());

        let out_of_range = FixPayload::ConfidenceThreshold {
            field: "amount".to_string(),
            floor: 1.2,
        };
        assert!(out_of_range.validate(&known).is_err());

        let unknown_field = FixPayload::ConfidenceThreshold {
            field: "surface_finish".to_string(),
            floor: 0.7,
        };
        let err = unknown_field.validate(&known).unwrap_err();
        assert!(err.contains("surface_finish"));
    }

    #[test]
    fn validation_rule_rejects_inverted_range() {
        let known = vec!["amount".to_string()];
        let inverted = FixPayload::ValidationRule {
            field: "amount".to_string(),
            min: 100.0,
            max: 1.0,
        };
        assert!(inverted.validate(&known).is_err());
    }

    #[test]
    fn payload_serializes_with_fix_type_tag() {
        let payload = FixPayload::FieldWeight {
            field: "vendor".to_string(),
            weight: 2.5,
        };
        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("\"fix_type\":\"FIELD_WEIGHT\""));

        let back: FixPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(back.fix_type(), FixType::FieldWeight);
    }
}
