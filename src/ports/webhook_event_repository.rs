//! WebhookEventRepository port - Ledger of processed Chargify webhooks.
//!
//! Chargify redelivers a webhook until it receives a 2xx, so the same
//! delivery can reach us several times:
//! - network timeouts
//! - 5xx responses from our endpoint
//! - our endpoint answering after Chargify gave up on the request
//!
//! The ledger records every webhook id once and keeps the payload and the
//! processing outcome for auditing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::foundation::DomainError;

/// Record of a processed webhook.
#[derive(Debug, Clone)]
pub struct WebhookEventRecord {
    /// Chargify webhook id.
    pub event_id: String,

    /// Chargify event name (e.g., "signup_success").
    pub event_type: String,

    /// When the webhook was processed.
    pub processed_at: DateTime<Utc>,

    /// Result of processing: "success" or "ignored".
    pub result: String,

    /// Ignore reason.
    pub error_message: Option<String>,

    /// Decoded webhook payload.
    pub payload: serde_json::Value,
}

impl WebhookEventRecord {
    fn with_result(
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        result: &str,
        error_message: Option<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            event_type: event_type.into(),
            processed_at: Utc::now(),
            result: result.to_string(),
            error_message,
            payload,
        }
    }

    pub fn success(
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self::with_result(event_id, event_type, "success", None, payload)
    }

    pub fn ignored(
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        reason: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self::with_result(event_id, event_type, "ignored", Some(reason.into()), payload)
    }
}

/// Result of attempting to save a webhook record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveResult {
    /// First time seeing this webhook.
    Inserted,
    /// Another delivery already recorded it.
    AlreadyExists,
}

/// Port for storing processed webhooks.
///
/// Implementations must make `save` atomic on `event_id` so concurrent
/// deliveries cannot both insert.
#[async_trait]
pub trait WebhookEventRepository: Send + Sync {
    async fn find_by_event_id(
        &self,
        event_id: &str,
    ) -> Result<Option<WebhookEventRecord>, DomainError>;

    /// Inserts unless a record with the same `event_id` exists.
    async fn save(&self, record: WebhookEventRecord) -> Result<SaveResult, DomainError>;

    /// Deletes records processed before `timestamp`, returning the count.
    async fn delete_before(&self, timestamp: DateTime<Utc>) -> Result<u64, DomainError>;
}

/// Outcome of handling one webhook delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookResult {
    Processed,
    /// Acknowledged without doing anything.
    Ignored,
    /// Duplicate delivery.
    AlreadyProcessed,
}
