//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! ## Provider Ports
//!
//! - `BillingProvider` - Chargify REST API
//!
//! ## Persistence Ports
//!
//! - `SubscriptionRepository` - Local subscription records and cached snapshots
//! - `TrialCouponRepository` - Trial coupons
//! - `NonceStore` - Single-use Chargify Direct nonces
//! - `WebhookEventRepository` - Chargify webhook idempotency tracking
//!
//! ## Analytics Ports
//!
//! - `EventTracker` - User event tracking

mod billing_provider;
mod event_tracker;
mod nonce_store;
mod subscription_repository;
mod trial_coupon_repository;
mod webhook_event_repository;

pub use billing_provider::{
    BillingError, BillingErrorCode, BillingProvider, CancelMode, CreateSubscriptionRequest,
    Customer, Metadata, MetadataResource, Page, PaymentCollectionMethod, PaymentProfile,
    DEFAULT_PER_PAGE,
};
pub use event_tracker::EventTracker;
pub use nonce_store::NonceStore;
pub use subscription_repository::SubscriptionRepository;
pub use trial_coupon_repository::TrialCouponRepository;
pub use webhook_event_repository::{
    SaveResult, WebhookEventRecord, WebhookEventRepository, WebhookResult,
};
