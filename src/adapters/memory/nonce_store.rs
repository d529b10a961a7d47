//! In-memory Chargify Direct nonce store.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::direct::Nonce;
use crate::domain::foundation::DomainError;
use crate::ports::NonceStore;

#[derive(Debug, Clone, Default)]
pub struct InMemoryNonceStore {
    nonces: Arc<RwLock<Vec<Nonce>>>,
}

impl InMemoryNonceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.nonces.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.nonces.read().await.is_empty()
    }
}

fn same(a: &Nonce, b: &Nonce) -> bool {
    a.service == b.service && a.value == b.value && a.timestamp == b.timestamp
}

#[async_trait]
impl NonceStore for InMemoryNonceStore {
    async fn save(&self, nonce: &Nonce) -> Result<(), DomainError> {
        self.nonces.write().await.push(nonce.clone());
        Ok(())
    }

    async fn find(
        &self,
        service: &str,
        value: &str,
        timestamp: &str,
    ) -> Result<Vec<Nonce>, DomainError> {
        Ok(self
            .nonces
            .read()
            .await
            .iter()
            .filter(|n| n.service == service && n.value == value && n.timestamp == timestamp)
            .cloned()
            .collect())
    }

    async fn delete(&self, nonce: &Nonce) -> Result<bool, DomainError> {
        let mut nonces = self.nonces.write().await;
        let before = nonces.len();
        nonces.retain(|n| !same(n, nonce));
        Ok(nonces.len() < before)
    }
}
