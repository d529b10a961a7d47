//! In-memory subscription repository.
//!
//! Useful for testing and development.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::foundation::{DomainError, ErrorCode, SubscriptionId, UserId};
use crate::domain::subscription::SubscriptionRecord;
use crate::ports::SubscriptionRepository;

#[derive(Debug, Clone, Default)]
pub struct InMemorySubscriptionRepository {
    records: Arc<RwLock<HashMap<SubscriptionId, SubscriptionRecord>>>,
}

impl InMemorySubscriptionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl SubscriptionRepository for InMemorySubscriptionRepository {
    async fn save(&self, record: &SubscriptionRecord) -> Result<(), DomainError> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.id) {
            return Err(DomainError::new(
                ErrorCode::SubscriptionExists,
                format!("Subscription {} already exists", record.id),
            ));
        }
        records.insert(record.id, record.clone());
        Ok(())
    }

    async fn update(&self, record: &SubscriptionRecord) -> Result<(), DomainError> {
        let mut records = self.records.write().await;
        match records.get_mut(&record.id) {
            Some(existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(DomainError::new(
                ErrorCode::SubscriptionNotFound,
                format!("Subscription {} not found", record.id),
            )),
        }
    }

    async fn find_by_id(
        &self,
        id: SubscriptionId,
    ) -> Result<Option<SubscriptionRecord>, DomainError> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn find_by_user_id(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<SubscriptionRecord>, DomainError> {
        let records = self.records.read().await;
        let mut found: Vec<_> = records
            .values()
            .filter(|r| &r.user_id == user_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(found)
    }

    async fn delete(&self, id: SubscriptionId) -> Result<(), DomainError> {
        self.records.write().await.remove(&id);
        Ok(())
    }
}
