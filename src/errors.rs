//! HTTP error mapping.
//!
//! Validation → 400 with the flattened error tree, missing task → 404,
//! everything the client cannot fix → 500.

use crate::persist::SaveFileError;
use crate::validation::ValidationErrors;
use crate::world::WorldError;
use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Validation failed")]
    Validation(ValidationErrors),
    #[error("Task not found")]
    NotFound(String),
    #[error("Task {0} already exists")]
    Conflict(String),
    #[error("Invalid admin token")]
    Unauthorized,
    #[error("Admin endpoint is disabled")]
    AdminDisabled,
    #[error("storage: {0}")]
    Storage(#[from] SaveFileError),
    #[error("{resource} lock poisoned")]
    LockPoisoned { resource: &'static str },
    #[error("internal: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::AdminDisabled => StatusCode::FORBIDDEN,
            ApiError::Storage(_) | ApiError::LockPoisoned { .. } | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn poisoned<T>(resource: &'static str) -> impl FnOnce(std::sync::PoisonError<T>) -> ApiError {
        move |_| ApiError::LockPoisoned { resource }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            ApiError::Validation(errors) => json!({ "error": self.to_string(), "details": errors }),
            ApiError::NotFound(id) => json!({ "error": self.to_string(), "id": id }),
            _ => json!({ "error": self.to_string() }),
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(body)).into_response()
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        ApiError::Validation(errors)
    }
}

impl From<WorldError> for ApiError {
    fn from(e: WorldError) -> Self {
        match e {
            WorldError::TaskNotFound(id) => ApiError::NotFound(id),
            WorldError::DuplicateId(id) => ApiError::Conflict(id),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(ValidationErrors::form(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Validation(ValidationErrors::form(rejection.body_text()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn world_errors_map_to_http() {
        assert_eq!(
            ApiError::from(WorldError::TaskNotFound("x".into())).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(WorldError::DuplicateId("x".into())).status_code(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn validation_is_bad_request() {
        let err = ApiError::from(ValidationErrors::field("title", "Title is required"));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "Validation failed");
    }
}
