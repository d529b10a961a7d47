//! HTTP adapter for billing endpoints.
//!
//! Exposes Chargify webhooks, the Chargify Direct round trip, subscription
//! views and the product catalog.

pub mod dto;
pub mod handlers;
pub mod routes;

pub use handlers::{AuthenticatedUser, BillingAppState};
pub use routes::{billing_router, billing_routes};
