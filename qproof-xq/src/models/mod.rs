//! Data models for the extraction-quality service

pub mod composite_result;
pub mod deployment_record;
pub mod extraction_record;
pub mod failure_pattern;
pub mod fix_proposal;
pub mod routing;

pub use composite_result::{AppliedFix, CompositeResult, PricingOutcome};
pub use deployment_record::{DeploymentAction, DeploymentEnvironment, DeploymentRecord};
pub use extraction_record::{ExtractedField, ExtractionRecord};
pub use failure_pattern::{FailurePattern, PatternStatus, PatternType, Severity};
pub use fix_proposal::{FixPayload, FixProposal, FixStatus, FixType};
pub use routing::{RoutingDecision, RoutingTier};
