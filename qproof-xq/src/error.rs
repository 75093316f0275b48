//! API error types for qproof-xq

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::services::KnowledgeError;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Conflict (409), e.g. an illegal fix transition
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Well-formed request that fails a gate check (422)
    #[error("Unprocessable: {0}")]
    Unprocessable(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// qproof-common error
    #[error("Common error: {0}")]
    Common(#[from] qproof_common::Error),
}

impl From<KnowledgeError> for ApiError {
    fn from(err: KnowledgeError) -> Self {
        match err {
            KnowledgeError::InvalidTransition { .. } | KnowledgeError::WindowExpired { .. } => {
                ApiError::Conflict(err.to_string())
            }
            KnowledgeError::ValidationFailed(_) => ApiError::Unprocessable(err.to_string()),
            KnowledgeError::NotFound(what) => ApiError::NotFound(what),
            KnowledgeError::Database(e) => ApiError::Internal(e.to_string()),
            KnowledgeError::Common(e) => ApiError::Common(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Unprocessable(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_FAILED", msg)
            }
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
            ApiError::Common(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "COMMON_ERROR",
                err.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_transition_maps_to_conflict() {
        let err: ApiError = KnowledgeError::InvalidTransition {
            from: "DRAFT".to_string(),
            to: "PRODUCTION".to_string(),
        }
        .into();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[test]
    fn gate_failure_maps_to_unprocessable() {
        let err: ApiError =
            KnowledgeError::ValidationFailed("test success rate 0.80 below required 0.85".into())
                .into();
        assert!(matches!(err, ApiError::Unprocessable(_)));
    }

    #[test]
    fn window_expired_maps_to_conflict() {
        let err: ApiError = KnowledgeError::WindowExpired {
            days_since_promotion: 31,
            window_days: 30,
        }
        .into();
        assert!(matches!(err, ApiError::Conflict(_)));
    }
}
