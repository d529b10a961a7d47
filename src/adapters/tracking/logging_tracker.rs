//! Event trackers that write to the structured log or keep events in memory.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::foundation::UserId;
use crate::ports::EventTracker;

/// Emits each tracked event as a structured `tracing` record.
#[derive(Debug, Clone, Default)]
pub struct LoggingEventTracker;

impl LoggingEventTracker {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EventTracker for LoggingEventTracker {
    async fn track(&self, user_id: &UserId, label: &str, properties: Map<String, Value>) {
        tracing::info!(
            user_id = %user_id,
            event = label,
            properties = %serde_json::Value::Object(properties),
            "Tracked user event"
        );
    }
}

/// A tracked event kept by [`RecordingEventTracker`].
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedEvent {
    pub user_id: UserId,
    pub label: String,
    pub properties: Map<String, Value>,
}

/// Keeps tracked events in memory for assertions.
#[derive(Debug, Clone, Default)]
pub struct RecordingEventTracker {
    events: Arc<RwLock<Vec<TrackedEvent>>>,
}

impl RecordingEventTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<TrackedEvent> {
        self.events.read().await.clone()
    }

    /// Labels of tracked events, in order.
    pub async fn labels(&self) -> Vec<String> {
        self.events
            .read()
            .await
            .iter()
            .map(|e| e.label.clone())
            .collect()
    }
}

#[async_trait]
impl EventTracker for RecordingEventTracker {
    async fn track(&self, user_id: &UserId, label: &str, properties: Map<String, Value>) {
        self.events.write().await.push(TrackedEvent {
            user_id: user_id.clone(),
            label: label.to_string(),
            properties,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn recording_tracker_keeps_events_in_order() {
        let tracker = RecordingEventTracker::new();
        let user = UserId::new("42").unwrap();
        let mut properties = Map::new();
        properties.insert("plan_label".into(), json!("Monthly"));

        tracker.track(&user, "Reactivate", properties.clone()).await;
        tracker.track(&user, "Credit card payment failed", Map::new()).await;

        let events = tracker.events().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].properties, properties);
        assert_eq!(
            tracker.labels().await,
            vec!["Reactivate".to_string(), "Credit card payment failed".to_string()]
        );
    }

    #[tokio::test]
    async fn logging_tracker_never_fails() {
        let tracker = LoggingEventTracker::new();
        tracker
            .track(&UserId::new("42").unwrap(), "Reactivate", Map::new())
            .await;
    }
}
