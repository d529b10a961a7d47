//! In-memory adapters for the persistence ports.
//!
//! Used by tests and local development without a database.

mod nonce_store;
mod subscription_repository;
mod trial_coupon_repository;
mod webhook_event_repository;

pub use nonce_store::InMemoryNonceStore;
pub use subscription_repository::InMemorySubscriptionRepository;
pub use trial_coupon_repository::InMemoryTrialCouponRepository;
pub use webhook_event_repository::InMemoryWebhookEventRepository;
