use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Request-path errors and their HTTP mapping. Background pipelines never
/// surface here; they retry, log, or spill to the DLQ instead.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Unauthenticated(&'static str),

    /// Billing sentinel; carries its own status code so clients can react.
    #[error("insufficient balance")]
    InsufficientFunds,

    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::InsufficientFunds => StatusCode::PAYMENT_REQUIRED,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self, "request failed");
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                ApiError::InvalidInput("bad body".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::Unauthenticated("api key not found"),
                StatusCode::UNAUTHORIZED,
            ),
            (ApiError::InsufficientFunds, StatusCode::PAYMENT_REQUIRED),
            (
                ApiError::Internal("boom".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn test_insufficient_funds_body_text() {
        assert_eq!(
            ApiError::InsufficientFunds.to_string(),
            "insufficient balance"
        );
    }
}
