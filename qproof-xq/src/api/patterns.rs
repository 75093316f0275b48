//! Failure pattern inspection endpoints

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::db::outcomes::TimelineBucket;
use crate::db::patterns;
use crate::error::{ApiError, ApiResult};
use crate::models::{FailurePattern, PatternStatus};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// Optional status filter, e.g. `?status=UNDER_REVIEW`
    pub status: Option<PatternStatus>,
}

/// GET /patterns
pub async fn list_patterns(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<FailurePattern>>> {
    let patterns = match query.status {
        Some(status) => patterns::list_patterns_with_status(&state.db, &[status]).await?,
        None => patterns::list_patterns(&state.db).await?,
    };
    Ok(Json(patterns))
}

/// GET /patterns/report
///
/// Human-readable triage summary of open patterns, as plain text.
pub async fn pattern_report(State(state): State<AppState>) -> ApiResult<String> {
    Ok(state.analyzer.export_report().await?)
}

/// GET /patterns/:signature
pub async fn get_pattern(
    State(state): State<AppState>,
    Path(signature): Path<String>,
) -> ApiResult<Json<FailurePattern>> {
    let pattern = patterns::get_pattern(&state.db, &signature)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("pattern '{}'", signature)))?;
    Ok(Json(pattern))
}

/// GET /patterns/:signature/timeline
///
/// Daily occurrence counts for trend display.
pub async fn pattern_timeline(
    State(state): State<AppState>,
    Path(signature): Path<String>,
) -> ApiResult<Json<Vec<TimelineBucket>>> {
    Ok(Json(state.analyzer.timeline(&signature).await?))
}

/// Build pattern routes
pub fn pattern_routes() -> Router<AppState> {
    Router::new()
        .route("/patterns", get(list_patterns))
        .route("/patterns/report", get(pattern_report))
        .route("/patterns/:signature", get(get_pattern))
        .route("/patterns/:signature/timeline", get(pattern_timeline))
}
