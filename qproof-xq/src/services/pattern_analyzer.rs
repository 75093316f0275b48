//! Pattern Analyzer Service
//!
//! Clusters recurring low-confidence outcomes into named failure patterns.
//! The outcome history table is the source of truth: frequencies are derived
//! counts, so overlapping windows and replays never double-count.

use chrono::Utc;
use qproof_common::events::{EventBus, QproofEvent};
use qproof_common::Result;
use sqlx::SqlitePool;

use crate::config::{QualityParameters, RouterConfig};
use crate::db::{outcomes, patterns};
use crate::models::{
    ExtractionRecord, FailurePattern, PatternStatus, PatternType, RoutingDecision, Severity,
};

/// OCR quality below this counts as an OCR-degradation signal
const OCR_QUALITY_SIGNAL_BOUND: f64 = 0.8;

/// Pattern Analyzer
///
/// Owns the `failure_patterns` table. `record_outcome` is the lightweight
/// per-event path; `analyze` replays a window through the same path.
pub struct PatternAnalyzer {
    db: SqlitePool,
    event_bus: EventBus,
}

impl PatternAnalyzer {
    pub fn new(db: SqlitePool, event_bus: EventBus) -> Self {
        Self { db, event_bus }
    }

    /// Stable signature for a low-confidence occurrence
    ///
    /// `field:bucket:type`, with 0.10-wide confidence buckets, e.g.
    /// `amount:0.60-0.70:OCR_FAILURE`.
    pub fn signature_for(field: &str, confidence: f64, pattern_type: PatternType) -> String {
        let clamped = confidence.clamp(0.0, 1.0);
        // 1.0 lands in the top bucket rather than opening "1.00-1.10"
        let bucket_low = ((clamped * 10.0).floor() / 10.0).min(0.9);
        format!(
            "{}:{:.2}-{:.2}:{}",
            field,
            bucket_low,
            bucket_low + 0.1,
            pattern_type.as_str()
        )
    }

    /// Infer the cause class for a low-confidence field from record signals
    fn infer_pattern_type(record: &ExtractionRecord, field: &str) -> PatternType {
        if record.calc_error {
            return PatternType::CalcError;
        }
        if record.missing_entities.iter().any(|e| e == field) {
            return PatternType::NerMiss;
        }
        if record.ocr_quality < OCR_QUALITY_SIGNAL_BOUND {
            return PatternType::OcrFailure;
        }
        // Low confidence without a stronger signal reads as OCR degradation
        PatternType::OcrFailure
    }

    /// Low-confidence occurrences a record contributes, as
    /// `(field, confidence, type)`
    fn occurrences_for(
        record: &ExtractionRecord,
        config: &RouterConfig,
    ) -> Vec<(String, f64, PatternType)> {
        // Low-confidence fields present on the record
        let mut occurrences: Vec<(String, f64, PatternType)> = record
            .fields
            .iter()
            .filter(|(field, extracted)| {
                extracted.confidence < config.low_confidence_threshold(field)
            })
            .map(|(field, extracted)| {
                (
                    field.clone(),
                    extracted.confidence,
                    Self::infer_pattern_type(record, field),
                )
            })
            .collect();

        // Expected-but-absent entities count as zero-confidence misses
        for entity in &record.missing_entities {
            if !record.fields.contains_key(entity) {
                occurrences.push((entity.clone(), 0.0, PatternType::NerMiss));
            }
        }

        occurrences
    }

    /// Record one extraction outcome incrementally
    ///
    /// Inserts low-confidence field occurrences into the outcome history and
    /// upserts any pattern whose derived count reaches the minimum-occurrence
    /// bound. Does not re-scan history beyond indexed counts. Returns the
    /// patterns touched by this record.
    pub async fn record_outcome(
        &self,
        record: &ExtractionRecord,
        decision: &RoutingDecision,
        config: &RouterConfig,
        params: &QualityParameters,
    ) -> Result<Vec<FailurePattern>> {
        let observed_at = Utc::now();
        let mut touched = Vec::new();

        for (field, confidence, pattern_type) in Self::occurrences_for(record, config) {
            let signature = Self::signature_for(&field, confidence, pattern_type);

            let newly_recorded = outcomes::insert_outcome(
                &self.db,
                record.record_id,
                &field,
                &signature,
                confidence,
                decision.tier.as_str(),
                observed_at,
            )
            .await?;
            if !newly_recorded {
                continue;
            }

            let count = outcomes::count_for_signature(&self.db, &signature).await?;
            if count < params.min_occurrences {
                continue;
            }

            let span = outcomes::observation_span(&self.db, &signature).await?;
            let (first_seen, last_seen) = span.unwrap_or((observed_at, observed_at));

            let business_weight = config.field_weights.get(&field).copied().unwrap_or(1.0);
            let severity = Severity::from_weighted_frequency(count as f64 * business_weight);

            let existed = patterns::get_pattern(&self.db, &signature).await?.is_some();

            let pattern = FailurePattern {
                signature: signature.clone(),
                pattern_type,
                field_name: field.clone(),
                frequency: count,
                first_seen,
                last_seen,
                root_cause: pattern_type.root_cause_template(&field),
                severity,
                status: PatternStatus::New,
            };
            patterns::upsert_pattern(&self.db, &pattern).await?;

            if !existed {
                tracing::info!(
                    signature = %signature,
                    frequency = count,
                    severity = severity.as_str(),
                    "Failure pattern detected"
                );
                self.event_bus.emit_lossy(QproofEvent::PatternDetected {
                    signature: signature.clone(),
                    field_name: field.clone(),
                    frequency: count,
                    severity: severity.as_str().to_string(),
                    timestamp: observed_at,
                });
            }

            // Re-read to pick up preserved status/root_cause of existing rows
            if let Some(stored) = patterns::get_pattern(&self.db, &signature).await? {
                touched.push(stored);
            }
        }

        Ok(touched)
    }

    /// Analyze a window of past outcomes
    ///
    /// Replays the window through the incremental path. Safe to call
    /// repeatedly with overlapping windows: already-recorded outcomes are
    /// ignored, and pattern upserts are monotone. Returns all patterns whose
    /// signature occurred in the window.
    pub async fn analyze(
        &self,
        window: &[(ExtractionRecord, RoutingDecision)],
        config: &RouterConfig,
        params: &QualityParameters,
    ) -> Result<Vec<FailurePattern>> {
        // Signatures come from the window itself, not from what got newly
        // recorded, so a replay still reports the window's pattern set
        let mut signatures = Vec::new();
        for (record, decision) in window {
            self.record_outcome(record, decision, config, params).await?;
            for (field, confidence, pattern_type) in Self::occurrences_for(record, config) {
                let signature = Self::signature_for(&field, confidence, pattern_type);
                if !signatures.contains(&signature) {
                    signatures.push(signature);
                }
            }
        }

        let mut result = Vec::new();
        for signature in signatures {
            if let Some(pattern) = patterns::get_pattern(&self.db, &signature).await? {
                result.push(pattern);
            }
        }
        Ok(result)
    }

    /// Frequency-over-time buckets for a pattern signature
    pub async fn timeline(&self, signature: &str) -> Result<Vec<outcomes::TimelineBucket>> {
        outcomes::timeline(&self.db, signature).await
    }

    /// Human-readable triage summary of NEW and UNDER_REVIEW patterns
    pub async fn export_report(&self) -> Result<String> {
        let open = patterns::list_patterns_with_status(
            &self.db,
            &[PatternStatus::New, PatternStatus::UnderReview],
        )
        .await?;

        let mut report = String::new();
        report.push_str(&format!(
            "Extraction failure patterns awaiting triage: {}\n",
            open.len()
        ));
        for pattern in &open {
            report.push_str(&format!(
                "- [{}] {} ({}), field '{}', seen {}x between {} and {}\n  cause: {}\n",
                pattern.severity.as_str(),
                pattern.signature,
                pattern.status.as_str(),
                pattern.field_name,
                pattern.frequency,
                pattern.first_seen.format("%Y-%m-%d"),
                pattern.last_seen.format("%Y-%m-%d"),
                pattern.root_cause,
            ));
        }
        Ok(report)
    }
}
