//! Chargify webhook handling.

mod handle_chargify_webhook;

pub use handle_chargify_webhook::{HandleChargifyWebhookCommand, HandleChargifyWebhookHandler};
