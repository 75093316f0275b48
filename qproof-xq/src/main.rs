//! qproof-xq - Extraction Quality Microservice
//!
//! **Module Identity:**
//! - Name: qproof-xq (Extraction Quality)
//! - Port: 5731
//!
//! Routes extraction records into action tiers by weighted confidence,
//! detects recurring failure patterns, and manages staged deployment of fix
//! proposals with automatic rollback.

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use qproof_common::events::EventBus;
use qproof_xq::services::{PricingClient, VerificationAgent};
use qproof_xq::AppState;

const DEFAULT_AGENT_TIMEOUT_MS: u64 = 10_000;

#[tokio::main]
async fn main() -> Result<()> {
    // Config file is optional; a missing file means compiled defaults
    let toml_config = qproof_common::config::default_config_path()
        .filter(|path| path.exists())
        .map(|path| qproof_common::config::load_toml_config(&path))
        .transpose()?;

    let log_level = toml_config
        .as_ref()
        .and_then(|c| c.log_level.clone())
        .unwrap_or_else(|| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .init();

    info!("Starting qproof-xq (Extraction Quality) microservice");
    info!("Port: 5731");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let data_dir = qproof_common::config::resolve_data_dir(toml_config.as_ref());
    qproof_common::config::ensure_data_dir(&data_dir)
        .map_err(|e| anyhow::anyhow!("Failed to initialize data directory: {}", e))?;

    let db_path = data_dir.join("qproof.db");
    info!("Database: {}", db_path.display());
    let db_pool = qproof_xq::db::init_database_pool(&db_path).await?;
    info!("Database connection established");

    let event_bus = EventBus::new(100);

    let agent_url = toml_config
        .as_ref()
        .and_then(|c| c.agent_url.clone())
        .unwrap_or_else(|| "http://127.0.0.1:5741".to_string());
    let agent_timeout_ms = toml_config
        .as_ref()
        .and_then(|c| c.agent_timeout_ms)
        .unwrap_or(DEFAULT_AGENT_TIMEOUT_MS);
    let agent = VerificationAgent::new(&agent_url, agent_timeout_ms);
    info!("Verification agent: {}", agent_url);

    let pricing = toml_config
        .as_ref()
        .and_then(|c| c.pricing_url.clone())
        .map(|url| {
            info!("Pricing collaborator: {}", url);
            PricingClient::new(&url, agent_timeout_ms)
        });
    if pricing.is_none() {
        info!("Pricing collaborator not configured; records will not be priced");
    }

    let state = AppState::new(db_pool, event_bus, agent, pricing);
    let app = qproof_xq::build_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:5731").await?;
    info!("Listening on http://127.0.0.1:5731");
    info!("Health check: http://127.0.0.1:5731/health");

    axum::serve(listener, app).await?;

    Ok(())
}
