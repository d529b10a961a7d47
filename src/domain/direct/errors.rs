//! Chargify Direct errors.

use axum::http::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DirectError {
    #[error("Missing callback parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Callback api_id does not match the configured Direct API id")]
    ApiIdMismatch,

    #[error("No nonce matches the callback")]
    NonceNotFound,

    #[error("{0} nonces match the callback")]
    AmbiguousNonce(usize),

    #[error("Nonce expired")]
    NonceExpired,

    #[error("Invalid callback signature")]
    InvalidSignature,

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Nonce store error: {0}")]
    Store(String),

    #[error("Provider error: {0}")]
    Provider(String),
}

impl DirectError {
    /// True for every error that means the callback must be rejected.
    pub fn is_invalid_callback(&self) -> bool {
        matches!(
            self,
            DirectError::MissingParameter(_)
                | DirectError::ApiIdMismatch
                | DirectError::NonceNotFound
                | DirectError::AmbiguousNonce(_)
                | DirectError::NonceExpired
                | DirectError::InvalidSignature
        )
    }

    pub fn status_code(&self) -> StatusCode {
        if self.is_invalid_callback() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
