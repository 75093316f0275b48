//! Confidence Router Service
//!
//! Weighted, field-aware routing of extraction records into action tiers.
//! Pure decision logic: no persistence, no side effects, safe to call
//! concurrently.

use rust_decimal::Decimal;

use crate::config::RouterConfig;
use crate::models::{ExtractionRecord, RoutingDecision, RoutingTier};

/// Confidence Router
///
/// Combines per-field confidences into a weighted average, checks
/// critical-field floors, and maps the result to a routing tier. Malformed
/// input degrades to `HumanReview`; this service never errors.
pub struct ConfidenceRouter {
    config: RouterConfig,
}

impl ConfidenceRouter {
    pub fn new(config: RouterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Route a single extraction record
    ///
    /// Tier bands on the weighted average (unknown fields weigh 1.0):
    /// >= auto_accept with low complexity -> AutoAccept, [verify, auto) ->
    /// AgentVerify, [extract, verify) -> AgentExtract, below -> HumanReview.
    /// Any critical-floor violation forces at minimum AgentExtract, or
    /// HumanReview when the violating confidence is also below the
    /// human-review bound.
    pub fn route(&self, record: &ExtractionRecord) -> RoutingDecision {
        if record.has_no_confidence_data() {
            return RoutingDecision {
                tier: RoutingTier::HumanReview,
                score: 0.0,
                reasoning: "no confidence data".to_string(),
                estimated_cost: Decimal::ZERO,
            };
        }

        let score = self.weighted_average(record);

        // Critical-field floors are hard violations regardless of the average
        let mut violations: Vec<(String, f64, f64)> = Vec::new();
        for (field, floor) in &self.config.critical_floors {
            if let Some(confidence) = record.confidence_of(field) {
                if confidence < *floor {
                    violations.push((field.clone(), confidence, *floor));
                }
            }
        }
        violations.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

        let (base_tier, base_reason) = self.tier_for_score(score, record.complexity_score);

        let (tier, reasoning) = if let Some((field, confidence, floor)) = violations.first() {
            let forced = if *confidence < self.config.human_review_bound {
                RoutingTier::HumanReview
            } else {
                RoutingTier::AgentExtract
            };
            // The floor forces a minimum escalation; a worse base tier stands
            let tier = if base_tier.rank() < forced.rank() {
                base_tier
            } else {
                forced
            };
            let reasoning = format!(
                "critical field '{}' confidence {:.2} below floor {:.2}",
                field, confidence, floor
            );
            (tier, reasoning)
        } else {
            (base_tier, base_reason)
        };

        RoutingDecision {
            tier,
            score,
            reasoning,
            estimated_cost: self.cost_for_tier(tier),
        }
    }

    /// Route a batch of records independently
    pub fn route_batch(&self, records: &[ExtractionRecord]) -> Vec<RoutingDecision> {
        records.iter().map(|record| self.route(record)).collect()
    }

    fn weighted_average(&self, record: &ExtractionRecord) -> f64 {
        let mut weighted_sum = 0.0;
        let mut weight_sum = 0.0;
        for (field, extracted) in &record.fields {
            let weight = self.config.field_weights.get(field).copied().unwrap_or(1.0);
            weighted_sum += extracted.confidence.clamp(0.0, 1.0) * weight;
            weight_sum += weight;
        }
        if weight_sum <= 0.0 {
            return 0.0;
        }
        weighted_sum / weight_sum
    }

    fn tier_for_score(&self, score: f64, complexity: f64) -> (RoutingTier, String) {
        let field_count_hint = format!("weighted average {:.3}", score);

        if score >= self.config.auto_accept_threshold {
            if complexity < self.config.low_complexity_bound {
                return (
                    RoutingTier::AutoAccept,
                    format!("{} with low document complexity {:.2}", field_count_hint, complexity),
                );
            }
            // High complexity blocks auto-accept but not agent verification
            return (
                RoutingTier::AgentVerify,
                format!(
                    "{} but document complexity {:.2} above low-complexity bound {:.2}",
                    field_count_hint, complexity, self.config.low_complexity_bound
                ),
            );
        }
        if score >= self.config.verify_threshold {
            return (
                RoutingTier::AgentVerify,
                format!("{} within agent-verify band", field_count_hint),
            );
        }
        if score >= self.config.extract_threshold {
            return (
                RoutingTier::AgentExtract,
                format!("{} within agent-extract band", field_count_hint),
            );
        }
        (
            RoutingTier::HumanReview,
            format!(
                "{} below extract threshold {:.2}",
                field_count_hint, self.config.extract_threshold
            ),
        )
    }

    fn cost_for_tier(&self, tier: RoutingTier) -> Decimal {
        match tier {
            RoutingTier::AutoAccept | RoutingTier::HumanReview => Decimal::ZERO,
            RoutingTier::AgentVerify => self.config.verify_cost,
            RoutingTier::AgentExtract => self.config.extract_cost,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExtractedField;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn record_with(fields: &[(&str, f64)], complexity: f64) -> ExtractionRecord {
        let fields: BTreeMap<String, ExtractedField> = fields
            .iter()
            .map(|(name, confidence)| {
                (
                    name.to_string(),
                    ExtractedField {
                        value: "x".to_string(),
                        confidence: *confidence,
                    },
                )
            })
            .collect();
        ExtractionRecord {
            record_id: Uuid::new_v4(),
            document_id: Uuid::new_v4(),
            fields,
            raw_text: String::new(),
            complexity_score: complexity,
            ocr_quality: 1.0,
            missing_entities: Vec::new(),
            calc_error: false,
            user_id: None,
        }
    }

    fn invoice_config() -> RouterConfig {
        let mut config = RouterConfig::default();
        config.field_weights.insert("amount".to_string(), 3.0);
        config.field_weights.insert("vendor".to_string(), 2.0);
        config.field_weights.insert("date".to_string(), 2.5);
        config
    }

    #[test]
    fn high_confidence_low_complexity_auto_accepts() {
        let router = ConfidenceRouter::new(invoice_config());
        let record = record_with(&[("amount", 0.95), ("vendor", 0.93), ("date", 0.91)], 0.2);

        let decision = router.route(&record);
        // 0.95*3 + 0.93*2 + 0.91*2.5 over 7.5 ~= 0.933
        assert!((decision.score - 0.9313).abs() < 0.001);
        assert_eq!(decision.tier, RoutingTier::AutoAccept);
        assert_eq!(decision.estimated_cost, Decimal::ZERO);
    }

    #[test]
    fn critical_floor_forces_agent_extract() {
        let mut config = invoice_config();
        config.critical_floors.insert("amount".to_string(), 0.70);
        let router = ConfidenceRouter::new(config);

        // Other fields high, only amount violates; 0.60 sits on the review
        // bound, not below it, so the forced tier is AgentExtract.
        let record = record_with(&[("amount", 0.60), ("vendor", 0.95), ("date", 0.95)], 0.2);
        let decision = router.route(&record);

        assert_eq!(decision.tier, RoutingTier::AgentExtract);
        assert!(decision.reasoning.contains("amount"));
        assert!(decision.reasoning.contains("0.70"));
    }

    #[test]
    fn floor_violation_in_the_extract_band_stays_agent_extract() {
        let mut config = invoice_config();
        config.critical_floors.insert("amount".to_string(), 0.70);
        let router = ConfidenceRouter::new(config);

        // 0.65 is below the extract threshold but above the review bound;
        // the violation escalates to AgentExtract, not all the way to human
        let record = record_with(&[("amount", 0.65), ("vendor", 0.95), ("date", 0.95)], 0.2);
        let decision = router.route(&record);
        assert_eq!(decision.tier, RoutingTier::AgentExtract);
    }

    #[test]
    fn floor_violation_below_review_bound_goes_to_human() {
        let mut config = invoice_config();
        config.critical_floors.insert("amount".to_string(), 0.80);
        let router = ConfidenceRouter::new(config);

        let record = record_with(&[("amount", 0.55), ("vendor", 0.95), ("date", 0.95)], 0.2);
        let decision = router.route(&record);
        assert_eq!(decision.tier, RoutingTier::HumanReview);
    }

    #[test]
    fn floor_violation_never_auto_accepts() {
        let mut config = invoice_config();
        config.critical_floors.insert("amount".to_string(), 0.99);
        let router = ConfidenceRouter::new(config);

        let record = record_with(&[("amount", 0.95), ("vendor", 0.98), ("date", 0.98)], 0.1);
        let decision = router.route(&record);
        assert!(matches!(
            decision.tier,
            RoutingTier::AgentExtract | RoutingTier::HumanReview
        ));
    }

    #[test]
    fn tier_bands() {
        let router = ConfidenceRouter::new(RouterConfig::default());

        let verify = router.route(&record_with(&[("amount", 0.85)], 0.2));
        assert_eq!(verify.tier, RoutingTier::AgentVerify);
        assert!(verify.estimated_cost > Decimal::ZERO);

        let extract = router.route(&record_with(&[("amount", 0.75)], 0.2));
        assert_eq!(extract.tier, RoutingTier::AgentExtract);

        let human = router.route(&record_with(&[("amount", 0.50)], 0.2));
        assert_eq!(human.tier, RoutingTier::HumanReview);
        assert_eq!(human.estimated_cost, Decimal::ZERO);
    }

    #[test]
    fn boundary_scores() {
        let router = ConfidenceRouter::new(RouterConfig::default());

        assert_eq!(
            router.route(&record_with(&[("f", 0.92)], 0.0)).tier,
            RoutingTier::AutoAccept
        );
        assert_eq!(
            router.route(&record_with(&[("f", 0.80)], 0.0)).tier,
            RoutingTier::AgentVerify
        );
        assert_eq!(
            router.route(&record_with(&[("f", 0.70)], 0.0)).tier,
            RoutingTier::AgentExtract
        );
    }

    #[test]
    fn high_complexity_blocks_auto_accept() {
        let router = ConfidenceRouter::new(RouterConfig::default());
        let decision = router.route(&record_with(&[("amount", 0.95)], 0.9));
        assert_eq!(decision.tier, RoutingTier::AgentVerify);
        assert!(decision.reasoning.contains("complexity"));
    }

    #[test]
    fn empty_record_routes_to_human_review() {
        let router = ConfidenceRouter::new(invoice_config());
        let record = record_with(&[], 0.2);
        let decision = router.route(&record);
        assert_eq!(decision.tier, RoutingTier::HumanReview);
        assert_eq!(decision.reasoning, "no confidence data");
    }

    #[test]
    fn raising_one_confidence_never_worsens_the_tier() {
        let mut config = invoice_config();
        config.critical_floors.insert("amount".to_string(), 0.70);
        let router = ConfidenceRouter::new(config);

        let mut previous_rank = 0;
        for step in 0..=20 {
            let amount = step as f64 * 0.05;
            let record =
                record_with(&[("amount", amount), ("vendor", 0.85), ("date", 0.80)], 0.2);
            let rank = router.route(&record).tier.rank();
            assert!(
                rank >= previous_rank,
                "tier rank regressed at amount={}",
                amount
            );
            previous_rank = rank;
        }
    }

    #[test]
    fn batch_matches_single_routing() {
        let router = ConfidenceRouter::new(invoice_config());
        let records = vec![
            record_with(&[("amount", 0.95), ("vendor", 0.93), ("date", 0.91)], 0.2),
            record_with(&[("amount", 0.50)], 0.2),
        ];

        let decisions = router.route_batch(&records);
        assert_eq!(decisions.len(), 2);
        assert_eq!(decisions[0].tier, router.route(&records[0]).tier);
        assert_eq!(decisions[1].tier, RoutingTier::HumanReview);
    }
}
