//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `chargify` - Chargify REST client and a configurable mock
//! - `postgres` - sqlx repositories
//! - `memory` - In-memory repositories for tests and local runs
//! - `tracking` - Analytics event trackers
//! - `http` - Axum routes

pub mod chargify;
pub mod http;
pub mod memory;
pub mod postgres;
pub mod tracking;

pub use chargify::{ChargifyClient, ChargifyClientConfig, MockBillingProvider};
pub use memory::{
    InMemoryNonceStore, InMemorySubscriptionRepository, InMemoryTrialCouponRepository,
    InMemoryWebhookEventRepository,
};
pub use postgres::{
    PostgresNonceStore, PostgresSubscriptionRepository, PostgresTrialCouponRepository,
    PostgresWebhookEventRepository,
};
pub use tracking::{LoggingEventTracker, RecordingEventTracker};
