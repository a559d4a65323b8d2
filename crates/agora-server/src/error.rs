//! Service-error to HTTP-status translation.

use agora_engine::ServiceError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::info;

const LOG_TARGET: &str = "agora::http";

#[derive(Serialize)]
pub struct ErrorResponse {
    pub message: String,
}

pub struct ApiError(pub ServiceError);

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        Self(err)
    }
}

impl From<agora_db::DbError> for ApiError {
    fn from(err: agora_db::DbError) -> Self {
        Self(ServiceError::from(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        info!(target: LOG_TARGET, err = %self.0, "Request error");

        let (status, message) = match &self.0 {
            ServiceError::NotFound { .. } => (StatusCode::NOT_FOUND, self.0.to_string()),
            ServiceError::Conflict { .. } => (StatusCode::CONFLICT, self.0.to_string()),
            ServiceError::Gone { .. } => (StatusCode::GONE, self.0.to_string()),
            ServiceError::BadRequest { .. } => (StatusCode::BAD_REQUEST, self.0.to_string()),
            // Unexpected conditions surface as a generic message only.
            ServiceError::Db { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal error".to_string(),
            ),
        };
        (status, Json(ErrorResponse { message })).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
