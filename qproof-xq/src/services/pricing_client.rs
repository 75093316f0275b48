//! Pricing collaborator HTTP client
//!
//! Pricing is advisory: any failure here becomes a warning on the composite
//! result, never a processing failure.

use std::collections::BTreeMap;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;

use crate::models::ExtractionRecord;

/// Pricing collaborator errors
#[derive(Debug, Error)]
pub enum PricingError {
    #[error("Pricing request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Pricing service unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid pricing response: {0}")]
    InvalidResponse(String),
}

/// Pricing quote for one record
#[derive(Debug, Clone, Deserialize)]
pub struct PricingQuote {
    pub total: Decimal,
    #[serde(default)]
    pub breakdown: BTreeMap<String, Decimal>,
}

/// HTTP client for the pricing collaborator
pub struct PricingClient {
    client: reqwest::Client,
    base_url: String,
    timeout_ms: u64,
}

impl PricingClient {
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

    /// Request a price quote for a processed record
    pub async fn quote(&self, record: &ExtractionRecord) -> Result<PricingQuote, PricingError> {
        let body = serde_json::json!({
            "record_id": record.record_id,
            "document_id": record.document_id,
            "fields": record.fields,
        });

        let url = format!("{}/v1/quote", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PricingError::Timeout {
                        timeout_ms: self.timeout_ms,
                    }
                } else {
                    PricingError::Unavailable(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(PricingError::Unavailable(format!(
                "pricing returned {}",
                response.status()
            )));
        }

        response
            .json::<PricingQuote>()
            .await
            .map_err(|e| PricingError::InvalidResponse(e.to_string()))
    }
}
