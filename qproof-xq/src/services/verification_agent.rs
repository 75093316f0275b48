//! Verification agent HTTP client
//!
//! Calls the external agent service for AGENT_VERIFY and AGENT_EXTRACT
//! records. Timeouts and transport failures map to typed errors so the
//! orchestrator can release the budget reservation and degrade gracefully.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{ExtractedField, ExtractionRecord, RoutingTier};

/// Verification agent errors
#[derive(Debug, Error)]
pub enum AgentError {
    /// The agent did not answer within the configured timeout
    #[error("Agent request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Transport failure or non-success status from the agent
    #[error("Agent unavailable: {0}")]
    Unavailable(String),

    /// The agent answered with a body we could not interpret
    #[error("Invalid agent response: {0}")]
    InvalidResponse(String),
}

/// Request body sent to the agent service
#[derive(Debug, Serialize)]
struct AgentRequest<'a> {
    record_id: Uuid,
    /// "verify" re-checks existing values; "extract" re-reads the raw text
    mode: &'static str,
    fields: &'a BTreeMap<String, ExtractedField>,
    raw_text: &'a str,
}

/// Agent response: revised fields plus what the agent changed
#[derive(Debug, Clone, Deserialize)]
pub struct AgentVerification {
    /// Fields the agent revised; absent fields keep their original values
    pub revised_fields: BTreeMap<String, ExtractedField>,

    /// Free-form notes from the agent, shown to operators
    #[serde(default)]
    pub notes: Option<String>,
}

/// HTTP client for the verification agent service
pub struct VerificationAgent {
    client: reqwest::Client,
    base_url: String,
    timeout_ms: u64,
}

impl VerificationAgent {
    /// Build a client; `base_url` has no trailing slash
    pub fn new(base_url: &str, timeout_ms: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout_ms,
        }
    }

    /// Send a record to the agent for the given tier
    ///
    /// Only meaningful for the two agent tiers; the mode tells the agent
    /// whether to re-check values or re-extract from raw text.
    pub async fn verify(
        &self,
        record: &ExtractionRecord,
        tier: RoutingTier,
    ) -> Result<AgentVerification, AgentError> {
        let mode = match tier {
            RoutingTier::AgentVerify => "verify",
            RoutingTier::AgentExtract => "extract",
            _ => {
                return Err(AgentError::InvalidResponse(format!(
                    "tier {} does not use the agent",
                    tier.as_str()
                )))
            }
        };

        let request = AgentRequest {
            record_id: record.record_id,
            mode,
            fields: &record.fields,
            raw_text: &record.raw_text,
        };

        let url = format!("{}/v1/verify", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AgentError::Timeout {
                        timeout_ms: self.timeout_ms,
                    }
                } else {
                    AgentError::Unavailable(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(AgentError::Unavailable(format!(
                "agent returned {}",
                response.status()
            )));
        }

        response
            .json::<AgentVerification>()
            .await
            .map_err(|e| AgentError::InvalidResponse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_record_fields() {
        let mut fields = BTreeMap::new();
        fields.insert(
            "amount".to_string(),
            ExtractedField {
                value: "42.00".to_string(),
                confidence: 0.81,
            },
        );
        let request = AgentRequest {
            record_id: Uuid::new_v4(),
            mode: "verify",
            fields: &fields,
            raw_text: "Invoice total 42.00",
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["mode"], "verify");
        assert_eq!(json["fields"]["amount"]["value"], "42.00");
    }

    #[test]
    fn response_defaults_missing_notes() {
        let parsed: AgentVerification = serde_json::from_str(
            r#"{"revised_fields":{"amount":{"value":"42.00","confidence":0.97}}}"#,
        )
        .unwrap();
        assert!(parsed.notes.is_none());
        assert!((parsed.revised_fields["amount"].confidence - 0.97).abs() < 1e-9);
    }

    #[tokio::test]
    async fn auto_accept_tier_is_rejected() {
        let agent = VerificationAgent::new("http://localhost:1", 100);
        let record = ExtractionRecord {
            record_id: Uuid::new_v4(),
            document_id: Uuid::new_v4(),
            fields: BTreeMap::new(),
            raw_text: String::new(),
            complexity_score: 0.1,
            ocr_quality: 1.0,
            missing_entities: Vec::new(),
            calc_error: false,
            user_id: None,
        };
        let err = agent.verify(&record, RoutingTier::AutoAccept).await;
        assert!(matches!(err, Err(AgentError::InvalidResponse(_))));
    }
}
