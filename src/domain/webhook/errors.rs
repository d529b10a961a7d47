//! Webhook error types for Chargify webhook handling.
//!
//! Status codes drive Chargify's redelivery: 2xx acknowledges, anything
//! else is retried on its schedule.

use axum::http::StatusCode;
use thiserror::Error;

/// Errors that occur during webhook processing.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Webhook signature verification failed.
    #[error("Invalid signature")]
    InvalidSignature,

    /// A required request header is absent.
    #[error("Missing header: {0}")]
    MissingHeader(&'static str),

    /// Failed to parse the form body.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Required field missing from the webhook payload.
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    /// Fetching fresh data from Chargify failed.
    #[error("Provider error: {0}")]
    Provider(String),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(String),
}

impl WebhookError {
    /// Returns true if Chargify should deliver this webhook again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WebhookError::Provider(_) | WebhookError::Database(_))
    }

    /// Maps the error to an HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            WebhookError::InvalidSignature => StatusCode::UNAUTHORIZED,

            WebhookError::MissingHeader(_)
            | WebhookError::ParseError(_)
            | WebhookError::MissingField(_) => StatusCode::BAD_REQUEST,

            WebhookError::Provider(_) | WebhookError::Database(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}
