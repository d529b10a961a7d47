//! Nonce store port for Chargify Direct.

use async_trait::async_trait;

use crate::domain::direct::Nonce;
use crate::domain::foundation::DomainError;

#[async_trait]
pub trait NonceStore: Send + Sync {
    async fn save(&self, nonce: &Nonce) -> Result<(), DomainError>;

    /// All stored nonces matching `(service, value, timestamp)`.
    async fn find(
        &self,
        service: &str,
        value: &str,
        timestamp: &str,
    ) -> Result<Vec<Nonce>, DomainError>;

    /// Deletes the nonce, returning whether it was still stored.
    ///
    /// Only one of several concurrent deletes of the same nonce may return
    /// `true`.
    async fn delete(&self, nonce: &Nonce) -> Result<bool, DomainError>;
}
