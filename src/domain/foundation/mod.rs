//! Foundation module - Shared domain primitives.
//!
//! Identifiers and error types used across the billing domain.

mod errors;
mod ids;

pub use errors::{DomainError, ErrorCode, ValidationError};
pub use ids::{CustomerId, SubscriptionId, UserId};
