//! PostgreSQL adapters - Database implementations for repository ports.
//!
//! This module provides adapters for PostgreSQL-backed persistence:
//! - `PostgresSubscriptionRepository` - Subscription records with JSONB snapshots
//! - `PostgresTrialCouponRepository` - Trial coupons
//! - `PostgresNonceStore` - Chargify Direct nonces
//! - `PostgresWebhookEventRepository` - Processed webhook ledger
//!
//! The schema lives in `migrations/` and is applied with `sqlx::migrate!`.

mod nonce_store;
mod subscription_repository;
mod trial_coupon_repository;
mod webhook_event_repository;

pub use nonce_store::PostgresNonceStore;
pub use subscription_repository::PostgresSubscriptionRepository;
pub use trial_coupon_repository::PostgresTrialCouponRepository;
pub use webhook_event_repository::PostgresWebhookEventRepository;
