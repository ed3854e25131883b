use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Errors raised while deciding or recording a throttle outcome.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ThrottlerError {
    /// A record store failed to read, write or sweep.
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type ThrottlerResult<T> = Result<T, ThrottlerError>;

impl From<validator::ValidationErrors> for ThrottlerError {
    fn from(err: validator::ValidationErrors) -> Self {
        ThrottlerError::Validation(err.to_string())
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub code: u16,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str, code: u16) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
            code,
        }
    }

    pub fn from_throttler_error(err: &ThrottlerError) -> Self {
        match err {
            ThrottlerError::Storage(msg) => Self::new("storage_unavailable", msg, 503),
            ThrottlerError::Validation(msg) => Self::new("validation_error", msg, 422),
            ThrottlerError::Internal(msg) => Self::new("internal_error", msg, 500),
        }
    }
}

impl IntoResponse for ThrottlerError {
    fn into_response(self) -> Response {
        let body = ErrorResponse::from_throttler_error(&self);
        let status =
            StatusCode::from_u16(body.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_maps_to_service_unavailable() {
        let err = ThrottlerError::Storage("disk full".to_string());
        let body = ErrorResponse::from_throttler_error(&err);
        assert_eq!(body.code, 503);
        assert_eq!(body.error, "storage_unavailable");
        assert_eq!(body.message, "disk full");

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_error_display() {
        let err = ThrottlerError::Validation("bad status".to_string());
        assert_eq!(err.to_string(), "Validation error: bad status");
    }
}
