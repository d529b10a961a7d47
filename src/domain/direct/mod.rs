//! Chargify Direct: signed secure form parameters and redirect callback
//! verification guarded by single-use nonces.

mod errors;
mod nonce;
mod params;
mod signature;

pub use errors::DirectError;
pub use nonce::{Nonce, CHARGIFY_NONCE_SERVICE, DEFAULT_NONCE_TTL_SECS};
pub use params::{CallbackParams, SecureParams};
pub use signature::DirectSigner;

/// Result code Chargify reports for a successful Direct call.
pub const RESULT_CODE_SUCCESS: i64 = 2000;
