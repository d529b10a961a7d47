//! Subscription repository port.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, SubscriptionId, UserId};
use crate::domain::subscription::SubscriptionRecord;

/// Persistence for local subscription records and their cached snapshots.
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// Inserts a new record.
    ///
    /// # Errors
    ///
    /// - `SubscriptionExists` if a record with the same id exists
    async fn save(&self, record: &SubscriptionRecord) -> Result<(), DomainError>;

    /// Updates an existing record, snapshot included.
    ///
    /// # Errors
    ///
    /// - `SubscriptionNotFound` if the record does not exist
    async fn update(&self, record: &SubscriptionRecord) -> Result<(), DomainError>;

    async fn find_by_id(&self, id: SubscriptionId)
        -> Result<Option<SubscriptionRecord>, DomainError>;

    /// Records of a user, newest first.
    async fn find_by_user_id(&self, user_id: &UserId)
        -> Result<Vec<SubscriptionRecord>, DomainError>;

    async fn delete(&self, id: SubscriptionId) -> Result<(), DomainError>;
}
