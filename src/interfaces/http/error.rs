use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::warn;

use crate::domain::errors::PipelineError;

/// Wire shape of every failure result.
#[derive(Debug, Serialize)]
pub struct FailureBody {
    pub success: bool,
    pub message: String,
}

/// Boundary adapter: converts pipeline errors into structured HTTP failure
/// responses. Client mistakes map to 400, a missing model to 503, everything
/// on our side to 500.
pub struct ApiError(pub PipelineError);

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            PipelineError::InsufficientData { .. }
            | PipelineError::MissingField { .. }
            | PipelineError::InvalidUpload { .. }
            | PipelineError::EmptyCorpus => StatusCode::BAD_REQUEST,
            PipelineError::ModelUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            PipelineError::Store(_) | PipelineError::ArtifactLoad { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        if status.is_server_error() {
            warn!(error = %self.0, "request failed");
        }

        let body = FailureBody {
            success: false,
            message: self.0.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_map_to_400() {
        let response = ApiError(PipelineError::InsufficientData {
            available: 3,
            required: 5,
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_missing_model_maps_to_503() {
        let response = ApiError(PipelineError::ModelUnavailable).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
