//! Record processing endpoints

use axum::{extract::State, routing::post, Json, Router};

use crate::config;
use crate::error::ApiResult;
use crate::models::{CompositeResult, ExtractionRecord, RoutingDecision};
use crate::services::ConfidenceRouter;
use crate::AppState;

/// POST /process
///
/// Run one extraction record through the full quality pipeline and return
/// the composite result. Collaborator failures surface as warnings on the
/// result, not as HTTP errors.
pub async fn process_record(
    State(state): State<AppState>,
    Json(record): Json<ExtractionRecord>,
) -> ApiResult<Json<CompositeResult>> {
    let result = state.orchestrator.process(&record).await?;
    Ok(Json(result))
}

/// POST /process/batch
///
/// Process records independently, in order. One record's failure does not
/// abort the batch; failed records are reported by id.
pub async fn process_batch(
    State(state): State<AppState>,
    Json(records): Json<Vec<ExtractionRecord>>,
) -> ApiResult<Json<BatchResponse>> {
    let mut results = Vec::with_capacity(records.len());
    let mut failed = Vec::new();

    for record in &records {
        match state.orchestrator.process(record).await {
            Ok(result) => results.push(result),
            Err(e) => {
                tracing::warn!(record_id = %record.record_id, error = %e, "Batch record failed");
                failed.push(FailedRecord {
                    record_id: record.record_id,
                    error: e.to_string(),
                });
            }
        }
    }

    Ok(Json(BatchResponse { results, failed }))
}

/// POST /route
///
/// Dry run: route a record under the current production configuration
/// without recording an outcome or calling any collaborator.
pub async fn route_record(
    State(state): State<AppState>,
    Json(record): Json<ExtractionRecord>,
) -> ApiResult<Json<RoutingDecision>> {
    let router_config = config::load_router_config(&state.db).await?;
    let router = ConfidenceRouter::new(router_config);
    Ok(Json(router.route(&record)))
}

#[derive(Debug, serde::Serialize)]
pub struct BatchResponse {
    pub results: Vec<CompositeResult>,
    pub failed: Vec<FailedRecord>,
}

#[derive(Debug, serde::Serialize)]
pub struct FailedRecord {
    pub record_id: uuid::Uuid,
    pub error: String,
}

/// Build processing routes
pub fn process_routes() -> Router<AppState> {
    Router::new()
        .route("/process", post(process_record))
        .route("/process/batch", post(process_batch))
        .route("/route", post(route_record))
}
