//! Error types and HTTP error response handling.
//!
//! This module defines all application errors and how they are converted
//! into HTTP responses with appropriate status codes and JSON bodies.

use std::error::Error as _;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::stripe::StripeError;

/// Application-wide error type.
///
/// # Error Categories
///
/// - **Database Errors**: Any sqlx::Error from store operations
/// - **Authentication Errors**: Invalid or missing admin API keys
/// - **Payload Errors**: Webhook bodies that are not a usable event envelope
/// - **Processor Errors**: Failures talking to the payment processor API
/// - **Data Errors**: Processor objects that cannot be mirrored locally
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Store operation failed (e.g., connection error, query error).
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// API key is missing, invalid, or inactive.
    ///
    /// Returns HTTP 401 Unauthorized.
    #[error("Invalid API key")]
    InvalidApiKey,

    /// A record that processing depends on does not exist locally.
    ///
    /// Returns HTTP 404 Not Found.
    #[error("{0} not found")]
    NotFound(String),

    /// Webhook body is not JSON or is missing envelope fields.
    ///
    /// Returns HTTP 400 Bad Request.
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// Query parameters or path values are invalid.
    ///
    /// Returns HTTP 400 Bad Request.
    #[error("Invalid request")]
    InvalidRequest(String),

    /// A webhook was built for an event of a different kind.
    #[error("Webhook {handler} cannot process event of kind {event}")]
    EventKindMismatch { handler: String, event: String },

    /// The payment processor API call failed.
    ///
    /// Returns HTTP 502 Bad Gateway.
    #[error("Payment processor error: {0}")]
    Stripe(#[from] StripeError),

    /// A processor object did not have the expected shape.
    ///
    /// Returns HTTP 422 Unprocessable Entity.
    #[error("Invalid processor object: {0}")]
    InvalidObject(#[from] serde_json::Error),
}

/// Result alias used by stores, services and handlers.
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Response body returned by the processor, when the error came from it.
    ///
    /// Stored as the `data` column of the exception log.
    pub fn processor_body(&self) -> Option<&str> {
        match self {
            AppError::Stripe(StripeError::Api { body, .. }) => Some(body.as_str()),
            _ => None,
        }
    }

    /// Debug rendering followed by the `source()` chain.
    pub fn traceback(&self) -> String {
        let mut trace = format!("{self:?}");
        let mut source = self.source();
        while let Some(cause) = source {
            trace.push_str("\nCaused by: ");
            trace.push_str(&cause.to_string());
            source = cause.source();
        }
        trace
    }
}

/// Convert AppError into an HTTP response.
///
/// # Response Format
///
/// ```json
/// {
///   "error": {
///     "code": "error_type",
///     "message": "Human-readable error message"
///   }
/// }
/// ```
///
/// Database and internal errors hide their details from the client.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::InvalidApiKey => (
                StatusCode::UNAUTHORIZED,
                "invalid_api_key",
                self.to_string(),
            ),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found", self.to_string()),
            AppError::MalformedPayload(_) => (
                StatusCode::BAD_REQUEST,
                "malformed_payload",
                self.to_string(),
            ),
            AppError::InvalidRequest(ref msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", msg.clone())
            }
            AppError::Stripe(_) => (
                StatusCode::BAD_GATEWAY,
                "processor_error",
                self.to_string(),
            ),
            AppError::InvalidObject(_) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "invalid_object",
                self.to_string(),
            ),
            AppError::Database(_) | AppError::EventKindMismatch { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "An internal error occurred".to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processor_body_only_for_api_errors() {
        let err = AppError::Stripe(StripeError::Api {
            status: 404,
            message: "No such event".into(),
            body: r#"{"error":{"message":"No such event"}}"#.into(),
        });
        assert_eq!(
            err.processor_body(),
            Some(r#"{"error":{"message":"No such event"}}"#)
        );
        assert!(AppError::InvalidApiKey.processor_body().is_none());
    }

    #[test]
    fn traceback_includes_source_chain() {
        let parse = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = AppError::InvalidObject(parse);
        let trace = err.traceback();
        assert!(trace.starts_with("InvalidObject"));
        assert!(trace.contains("Caused by: "));
    }

    #[test]
    fn status_codes() {
        let cases = [
            (AppError::InvalidApiKey, StatusCode::UNAUTHORIZED),
            (AppError::NotFound("Customer".into()), StatusCode::NOT_FOUND),
            (
                AppError::MalformedPayload("no id".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                AppError::EventKindMismatch {
                    handler: "a".into(),
                    event: "b".into(),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }
}
