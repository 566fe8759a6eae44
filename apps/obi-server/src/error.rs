//! Error types for the Obi-Tuke server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use obi_core::CompositeError;
use serde::Serialize;
use thiserror::Error;

/// Server error types
#[derive(Error, Debug)]
pub enum ServerError {
    #[error(transparent)]
    Composite(#[from] CompositeError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("{what} exceeds {limit_mb}MB limit")]
    PayloadTooLarge { what: &'static str, limit_mb: usize },

    #[error("Unsupported file: {0}")]
    UnsupportedMediaType(String),

    #[error("Processing timeout after {0}ms")]
    Timeout(u64),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
    code: String,
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::Composite(err) => match err {
                CompositeError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                CompositeError::OperationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
                _ => StatusCode::BAD_REQUEST,
            },
            ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ServerError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ServerError::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ServerError::Composite(err) => err.code(),
            ServerError::InvalidRequest(_) => "INVALID_REQUEST",
            ServerError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            ServerError::UnsupportedMediaType(_) => "UNSUPPORTED_MEDIA_TYPE",
            ServerError::Timeout(_) => "TIMEOUT",
            ServerError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::debug!("Request rejected ({}): {}", status, self);
        }

        let body = ErrorResponse {
            success: false,
            error: self.to_string(),
            code: self.code().to_string(),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_composite_error_status() {
        let cases = [
            (CompositeError::EmptyDocument, StatusCode::BAD_REQUEST),
            (
                CompositeError::InvalidColor("x".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                CompositeError::TooManyPages { count: 60, max: 50 },
                StatusCode::BAD_REQUEST,
            ),
            (CompositeError::MissingReplacement, StatusCode::BAD_REQUEST),
            (
                CompositeError::UnsupportedMediaType("bmp".into()),
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ),
            (
                CompositeError::OperationError("save".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ServerError::from(err).status(), status);
        }
    }

    #[test]
    fn test_codes_pass_through() {
        let err = ServerError::from(CompositeError::InvalidGeometry("h".into()));
        assert_eq!(err.code(), "INVALID_GEOMETRY");
        assert_eq!(
            ServerError::PayloadTooLarge {
                what: "PDF",
                limit_mb: 10
            }
            .to_string(),
            "PDF exceeds 10MB limit"
        );
    }
}
