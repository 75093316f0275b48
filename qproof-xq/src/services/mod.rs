//! Extraction-quality services

pub mod confidence_router;
pub mod knowledge_builder;
pub mod orchestrator;
pub mod pattern_analyzer;
pub mod pricing_client;
pub mod verification_agent;

pub use confidence_router::ConfidenceRouter;
pub use knowledge_builder::{KnowledgeError, SafeKnowledgeBuilder};
pub use orchestrator::QualityOrchestrator;
pub use pattern_analyzer::PatternAnalyzer;
pub use pricing_client::PricingClient;
pub use verification_agent::VerificationAgent;
