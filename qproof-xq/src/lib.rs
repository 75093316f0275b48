//! qproof-xq library interface for testing
//!
//! Exposes public APIs for integration testing

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use qproof_common::events::EventBus;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::services::{
    PatternAnalyzer, PricingClient, QualityOrchestrator, SafeKnowledgeBuilder, VerificationAgent,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Full-pipeline orchestrator
    pub orchestrator: Arc<QualityOrchestrator>,
    /// Fix proposal lifecycle
    pub builder: Arc<SafeKnowledgeBuilder>,
    /// Pattern detection and reporting
    pub analyzer: Arc<PatternAnalyzer>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        agent: VerificationAgent,
        pricing: Option<PricingClient>,
    ) -> Self {
        let orchestrator = Arc::new(QualityOrchestrator::new(
            db.clone(),
            event_bus.clone(),
            agent,
            pricing,
        ));
        let builder = Arc::new(SafeKnowledgeBuilder::new(db.clone(), event_bus.clone()));
        let analyzer = Arc::new(PatternAnalyzer::new(db.clone(), event_bus.clone()));
        Self {
            db,
            event_bus,
            orchestrator,
            builder,
            analyzer,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::process_routes())
        .merge(api::pattern_routes())
        .merge(api::fix_routes())
        .route("/events", get(api::event_stream))
        .merge(api::health_routes())
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}
