//! Extraction record as delivered by the upstream OCR/NER stage
//!
//! Records are immutable once produced; this service only reads them and
//! attaches derived results alongside.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// One extracted field: value plus per-field confidence in [0, 1]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedField {
    /// Extracted value as text (numeric fields carry their decimal rendering)
    pub value: String,

    /// Extractor confidence for this field (0.0 - 1.0)
    pub confidence: f64,
}

/// Structured output of the upstream extraction stage for one document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionRecord {
    /// Stable record identifier (assigned by the extraction stage)
    pub record_id: Uuid,

    /// Originating document identifier
    pub document_id: Uuid,

    /// Named fields with values and confidences
    ///
    /// BTreeMap keeps field iteration order deterministic, which keeps
    /// reasoning strings and signatures stable across runs.
    pub fields: BTreeMap<String, ExtractedField>,

    /// Raw text payload the fields were extracted from
    #[serde(default)]
    pub raw_text: String,

    /// Document-level complexity signal (0.0 = trivial, 1.0 = very complex)
    #[serde(default)]
    pub complexity_score: f64,

    /// OCR quality signal from the extraction stage (0.0 - 1.0)
    #[serde(default = "default_quality")]
    pub ocr_quality: f64,

    /// Entity names the extractor expected but did not find
    #[serde(default)]
    pub missing_entities: Vec<String>,

    /// Set when a downstream calculation step raised on this record
    #[serde(default)]
    pub calc_error: bool,

    /// Requesting user, for spend-cap accounting on agent tiers
    #[serde(default)]
    pub user_id: Option<String>,
}

fn default_quality() -> f64 {
    1.0
}

impl ExtractionRecord {
    /// Confidence of a named field, if present
    pub fn confidence_of(&self, field: &str) -> Option<f64> {
        self.fields.get(field).map(|f| f.confidence)
    }

    /// True when the record carries no usable confidence data
    pub fn has_no_confidence_data(&self) -> bool {
        self.fields.is_empty()
    }
}
