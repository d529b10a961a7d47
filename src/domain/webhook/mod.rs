//! Chargify webhooks: form decoding, signature verification and errors.

mod errors;
mod event;
mod form_params;
mod verifier;

pub use errors::WebhookError;
pub use event::{ChargifyWebhook, WebhookEventKind};
pub use form_params::{parse_webhook_body, parse_webhook_params};
pub use verifier::{ChargifyWebhookVerifier, SIGNATURE_HEADER, WEBHOOK_ID_HEADER};

pub(crate) use verifier::constant_time_compare;

#[cfg(test)]
pub use verifier::compute_test_signature;
