use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use crate::domain::error::{RegistryError, ValidationErrors};

/// Error returned by every REST and view handler.
#[derive(Debug)]
pub struct ApiError(pub RegistryError);

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        ApiError(err)
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        ApiError(RegistryError::Validation(errors))
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            RegistryError::Validation(_) => StatusCode::BAD_REQUEST,
            RegistryError::NotFound { .. } => StatusCode::NOT_FOUND,
            RegistryError::Integrity(_) => StatusCode::CONFLICT,
            RegistryError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self.0 {
            RegistryError::Validation(errors) => (status, Json(errors)).into_response(),
            RegistryError::Persistence(err) => {
                error!(error = %format!("{err:#}"), "registry write could not be persisted");
                (status, Json(json!({"detail": "Failed to persist changes."}))).into_response()
            }
            other => (status, Json(json!({"detail": other.to_string()}))).into_response(),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
