//! Analytics port.
//!
//! Subscription flows report notable user events (reactivations, payment
//! failures) through this port. Tracking is best effort: implementations
//! must not fail the calling flow.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::domain::foundation::UserId;

#[async_trait]
pub trait EventTracker: Send + Sync {
    async fn track(&self, user_id: &UserId, label: &str, properties: Map<String, Value>);
}
