//! Fix proposal lifecycle endpoints

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::config;
use crate::db::fixes;
use crate::error::{ApiError, ApiResult};
use crate::models::{DeploymentRecord, FixPayload, FixProposal};
use crate::services::knowledge_builder::{ChecklistItem, DeploymentImpact};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ProposeFixRequest {
    pub pattern_signature: String,
    pub payload: FixPayload,
    /// Offline validation success rate in [0, 1]
    pub test_success_rate: f64,
    /// Reviewing admin's confidence in [0, 1]
    pub admin_confidence_score: f64,
    pub created_by: String,
}

#[derive(Debug, Deserialize)]
pub struct ActorRequest {
    pub actor: String,
}

#[derive(Debug, Deserialize)]
pub struct ListFixesQuery {
    pub pattern_signature: String,
}

/// GET /fixes?pattern_signature=...
pub async fn list_fixes(
    State(state): State<AppState>,
    axum::extract::Query(query): axum::extract::Query<ListFixesQuery>,
) -> ApiResult<Json<Vec<FixProposal>>> {
    Ok(Json(
        fixes::list_fixes_for_pattern(&state.db, &query.pattern_signature).await?,
    ))
}

/// POST /fixes
pub async fn propose_fix(
    State(state): State<AppState>,
    Json(request): Json<ProposeFixRequest>,
) -> ApiResult<Json<FixProposal>> {
    let fix = state
        .builder
        .propose_fix(
            &request.pattern_signature,
            request.payload,
            request.test_success_rate,
            request.admin_confidence_score,
            &request.created_by,
        )
        .await?;
    Ok(Json(fix))
}

/// GET /fixes/:id
pub async fn get_fix(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<FixProposal>> {
    let fix = fixes::get_fix(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("fix proposal {}", id)))?;
    Ok(Json(fix))
}

/// GET /fixes/:id/checklist
///
/// Advisory pre-promotion checklist; does not change any state.
pub async fn deployment_checklist(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<ChecklistItem>>> {
    let fix = fixes::get_fix(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("fix proposal {}", id)))?;
    let router_config = config::load_router_config(&state.db).await?;
    let params = config::load_quality_parameters(&state.db).await?;
    let checklist = state
        .builder
        .create_deployment_checklist(&fix, &router_config, &params)
        .await?;
    Ok(Json(checklist))
}

/// GET /fixes/:id/impact
pub async fn deployment_impact(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<DeploymentImpact>> {
    Ok(Json(state.builder.get_deployment_impact(id).await?))
}

/// GET /fixes/:id/history
pub async fn deployment_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<DeploymentRecord>>> {
    Ok(Json(state.builder.deployment_history(id).await?))
}

/// POST /fixes/:id/apply - stage a draft fix
pub async fn apply_fix(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ActorRequest>,
) -> ApiResult<Json<FixProposal>> {
    let router_config = config::load_router_config(&state.db).await?;
    let fix = state
        .builder
        .apply_fix(id, &request.actor, &router_config)
        .await?;
    Ok(Json(fix))
}

/// POST /fixes/:id/promote - promote a staged fix to production
pub async fn promote_fix(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ActorRequest>,
) -> ApiResult<Json<FixProposal>> {
    let fix = state.builder.promote_fix(id, &request.actor).await?;
    Ok(Json(fix))
}

/// POST /fixes/:id/rollback - roll a production fix back
pub async fn rollback_fix(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ActorRequest>,
) -> ApiResult<Json<FixProposal>> {
    let params = config::load_quality_parameters(&state.db).await?;
    let fix = state
        .builder
        .rollback_fix(id, &request.actor, &params)
        .await?;
    Ok(Json(fix))
}

/// POST /fixes/check-health
///
/// Run the production monitoring pass; returns ids of auto-rolled-back
/// fixes. Normally driven by a scheduler, exposed for operators too.
pub async fn check_health(State(state): State<AppState>) -> ApiResult<Json<Vec<Uuid>>> {
    let params = config::load_quality_parameters(&state.db).await?;
    Ok(Json(state.builder.check_production_health(&params).await?))
}

/// Build fix lifecycle routes
pub fn fix_routes() -> Router<AppState> {
    Router::new()
        .route("/fixes", post(propose_fix).get(list_fixes))
        .route("/fixes/check-health", post(check_health))
        .route("/fixes/:id", get(get_fix))
        .route("/fixes/:id/checklist", get(deployment_checklist))
        .route("/fixes/:id/impact", get(deployment_impact))
        .route("/fixes/:id/history", get(deployment_history))
        .route("/fixes/:id/apply", post(apply_fix))
        .route("/fixes/:id/promote", post(promote_fix))
        .route("/fixes/:id/rollback", post(rollback_fix))
}
