//! Append-only deployment audit log entries
//!
//! Every accepted fix transition writes exactly one record. Entries are
//! never mutated or deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Target environment of a deployment action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeploymentEnvironment {
    Staging,
    Production,
}

impl DeploymentEnvironment {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentEnvironment::Staging => "STAGING",
            DeploymentEnvironment::Production => "PRODUCTION",
        }
    }
}

/// Kind of deployment action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeploymentAction {
    Apply,
    Rollback,
}

impl DeploymentAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentAction::Apply => "APPLY",
            DeploymentAction::Rollback => "ROLLBACK",
        }
    }
}

/// One audit log entry for a fix transition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub id: Uuid,

    /// Fix proposal this entry belongs to
    pub fix_id: Uuid,

    pub environment: DeploymentEnvironment,
    pub action: DeploymentAction,

    /// Point-in-time metrics captured with the action (JSON)
    pub metrics_snapshot: serde_json::Value,

    /// Operator name, or "system" for automatic rollbacks
    pub actor: String,

    pub timestamp: DateTime<Utc>,
}
