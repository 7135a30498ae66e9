//! Error handling for the REST API server.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt;

use strata_core::StrataError;

/// API error type.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "CONFLICT", message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.status, self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.code,
                message: self.message,
                details: self.details,
            },
        };

        (self.status, Json(body)).into_response()
    }
}

impl From<StrataError> for ApiError {
    fn from(err: StrataError) -> Self {
        let status = match &err {
            StrataError::InvalidInput { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            StrataError::NotFound { .. } => StatusCode::NOT_FOUND,
            StrataError::ConcurrentUpdateConflict { .. } | StrataError::PersistenceContention { .. } => {
                StatusCode::CONFLICT
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let mut details = serde_json::Map::new();
        match &err {
            StrataError::InvalidInput { field: Some(field), .. } => {
                details.insert("field".to_string(), field.clone().into());
            }
            StrataError::NotFound { id: Some(id), .. } => {
                details.insert("id".to_string(), id.clone().into());
            }
            _ => {}
        }
        if let Some(suggestion) = err.suggestion() {
            details.insert("suggestion".to_string(), suggestion.into());
        }

        let api = ApiError::new(status, err.code().as_str(), err.to_string());
        if details.is_empty() {
            api
        } else {
            api.with_details(serde_json::Value::Object(details))
        }
    }
}

// Malformed bodies are validation errors like any other bad input.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::validation(rejection.body_text())
    }
}

/// Result type alias for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_input_maps_to_422_with_field() {
        let err: ApiError = StrataError::invalid_field("content", "content must not be empty").into();
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
        let details = err.details.unwrap();
        assert_eq!(details["field"], "content");
    }

    #[test]
    fn test_status_mapping() {
        let not_found: ApiError = StrataError::item_not_found("x").into();
        assert_eq!(not_found.status, StatusCode::NOT_FOUND);

        let contention: ApiError = StrataError::PersistenceContention {
            id: "x".to_string(),
            attempts: 5,
        }
        .into();
        assert_eq!(contention.status, StatusCode::CONFLICT);

        let internal: ApiError = StrataError::Internal("boom".to_string()).into();
        assert_eq!(internal.status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
