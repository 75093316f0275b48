//! Failure pattern records
//!
//! A pattern names a recurring class of low-confidence outcomes, keyed by a
//! stable signature. Patterns are never deleted; they are retained for audit
//! and trend analysis.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Inferred cause class for a failure pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PatternType {
    /// Low OCR quality degraded the field
    OcrFailure,
    /// An expected entity was not recognized
    NerMiss,
    /// A downstream calculation raised on the extracted value
    CalcError,
}

impl PatternType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternType::OcrFailure => "OCR_FAILURE",
            PatternType::NerMiss => "NER_MISS",
            PatternType::CalcError => "CALC_ERROR",
        }
    }

    /// Templated root-cause explanation for triage
    pub fn root_cause_template(&self, field_name: &str) -> String {
        match self {
            PatternType::OcrFailure => format!(
                "OCR quality repeatedly too low to read field '{}' reliably",
                field_name
            ),
            PatternType::NerMiss => format!(
                "Entity recognizer repeatedly failed to locate expected field '{}'",
                field_name
            ),
            PatternType::CalcError => format!(
                "Extracted values for field '{}' repeatedly broke downstream calculation",
                field_name
            ),
        }
    }
}

/// Pattern severity, derived from frequency and field business weight
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "CRITICAL",
            Severity::High => "HIGH",
            Severity::Medium => "MEDIUM",
            Severity::Low => "LOW",
        }
    }

    /// Bucket a weighted frequency into a severity
    ///
    /// Weighted frequency = occurrence count x business weight of the field.
    pub fn from_weighted_frequency(weighted: f64) -> Self {
        if weighted >= 50.0 {
            Severity::Critical
        } else if weighted >= 25.0 {
            Severity::High
        } else if weighted >= 10.0 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

/// Pattern triage status, forward-only
///
/// New -> UnderReview -> FixCreated -> Resolved. Resolved reverts to
/// UnderReview only through an explicit fix rollback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PatternStatus {
    New,
    UnderReview,
    FixCreated,
    Resolved,
}

impl PatternStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternStatus::New => "NEW",
            PatternStatus::UnderReview => "UNDER_REVIEW",
            PatternStatus::FixCreated => "FIX_CREATED",
            PatternStatus::Resolved => "RESOLVED",
        }
    }

    fn order(&self) -> u8 {
        match self {
            PatternStatus::New => 0,
            PatternStatus::UnderReview => 1,
            PatternStatus::FixCreated => 2,
            PatternStatus::Resolved => 3,
        }
    }

    /// Forward-only advancement check (rollback bypasses this deliberately)
    pub fn can_advance_to(&self, next: PatternStatus) -> bool {
        next.order() == self.order() + 1
    }
}

/// A recurring low-confidence failure class
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailurePattern {
    /// Unique stable key: `field:confidence_bucket:pattern_type`
    pub signature: String,

    /// Inferred cause class
    pub pattern_type: PatternType,

    /// Field the pattern is about
    pub field_name: String,

    /// Matching outcome count (monotone, derived from outcome history)
    pub frequency: i64,

    /// First matching outcome
    pub first_seen: DateTime<Utc>,

    /// Most recent matching outcome
    pub last_seen: DateTime<Utc>,

    /// Templated root-cause explanation
    pub root_cause: String,

    /// Derived severity bucket
    pub severity: Severity,

    /// Triage status
    pub status: PatternStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_advances_forward_only() {
        assert!(PatternStatus::New.can_advance_to(PatternStatus::UnderReview));
        assert!(PatternStatus::UnderReview.can_advance_to(PatternStatus::FixCreated));
        assert!(PatternStatus::FixCreated.can_advance_to(PatternStatus::Resolved));

        assert!(!PatternStatus::Resolved.can_advance_to(PatternStatus::New));
        assert!(!PatternStatus::New.can_advance_to(PatternStatus::FixCreated));
        assert!(!PatternStatus::FixCreated.can_advance_to(PatternStatus::UnderReview));
    }

    #[test]
    fn severity_buckets() {
        assert_eq!(Severity::from_weighted_frequency(5.0), Severity::Low);
        assert_eq!(Severity::from_weighted_frequency(10.0), Severity::Medium);
        assert_eq!(Severity::from_weighted_frequency(30.0), Severity::High);
        assert_eq!(Severity::from_weighted_frequency(75.0), Severity::Critical);
    }

    #[test]
    fn root_cause_names_the_field() {
        let cause = PatternType::OcrFailure.root_cause_template("amount");
        assert!(cause.contains("amount"));
    }
}
