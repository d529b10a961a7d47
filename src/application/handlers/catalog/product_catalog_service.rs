//! ProductCatalogService - Time-bounded cache of the Chargify catalog.
//!
//! The catalog is rebuilt wholesale from every product family once it is
//! older than the refresh interval. Concurrent readers share one reload.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::RwLock;

use crate::domain::catalog::{Product, ProductCatalog};
use crate::domain::foundation::{DomainError, ErrorCode};
use crate::ports::BillingProvider;

pub struct ProductCatalogService {
    provider: Arc<dyn BillingProvider>,
    paying_handles: Vec<String>,
    trial_handle: String,
    refresh_interval: Duration,
    cache: RwLock<Option<Arc<ProductCatalog>>>,
}

impl ProductCatalogService {
    pub fn new(
        provider: Arc<dyn BillingProvider>,
        paying_handles: Vec<String>,
        trial_handle: impl Into<String>,
        refresh_interval: Duration,
    ) -> Self {
        Self {
            provider,
            paying_handles,
            trial_handle: trial_handle.into(),
            refresh_interval,
            cache: RwLock::new(None),
        }
    }

    /// Current catalog, reloaded from Chargify when missing or outdated.
    pub async fn catalog(&self) -> Result<Arc<ProductCatalog>, DomainError> {
        if let Some(catalog) = self.fresh(&*self.cache.read().await) {
            return Ok(catalog);
        }

        let mut cache = self.cache.write().await;
        // Another task may have reloaded while we waited for the lock.
        if let Some(catalog) = self.fresh(&cache) {
            return Ok(catalog);
        }

        let catalog = Arc::new(self.load().await?);
        *cache = Some(catalog.clone());
        Ok(catalog)
    }

    /// Drops the cached catalog and loads a new one.
    pub async fn reload(&self) -> Result<Arc<ProductCatalog>, DomainError> {
        let mut cache = self.cache.write().await;
        let catalog = Arc::new(self.load().await?);
        *cache = Some(catalog.clone());
        Ok(catalog)
    }

    pub async fn get(&self, handle: &str) -> Result<Product, DomainError> {
        self.catalog()
            .await?
            .get(handle)
            .cloned()
            .ok_or_else(|| product_not_found(handle))
    }

    pub async fn get_by_id(&self, product_id: i64) -> Result<Product, DomainError> {
        self.catalog()
            .await?
            .get_by_id(product_id)
            .cloned()
            .ok_or_else(|| product_not_found(&product_id.to_string()))
    }

    /// Paying products in configured order.
    pub async fn paying(&self) -> Result<Vec<Product>, DomainError> {
        Ok(self.catalog().await?.paying().into_iter().cloned().collect())
    }

    pub async fn trial(&self) -> Result<Product, DomainError> {
        self.catalog()
            .await?
            .trial()
            .cloned()
            .ok_or_else(|| product_not_found(&self.trial_handle))
    }

    fn fresh(&self, cached: &Option<Arc<ProductCatalog>>) -> Option<Arc<ProductCatalog>> {
        cached
            .as_ref()
            .filter(|c| !c.is_outdated(Instant::now(), self.refresh_interval))
            .cloned()
    }

    async fn load(&self) -> Result<ProductCatalog, DomainError> {
        let mut products = Vec::new();
        for family in self.provider.product_families().await? {
            let Some(family_id) = family.get("id").and_then(Value::as_i64) else {
                tracing::warn!(family = %family, "Skipping product family without id");
                continue;
            };
            for raw in self.provider.family_products(family_id).await? {
                match Product::from_provider(raw) {
                    Ok(product) => products.push(product),
                    Err(e) => tracing::warn!(family_id, error = %e, "Skipping malformed product"),
                }
            }
        }

        let catalog = ProductCatalog::build(
            products,
            &self.paying_handles,
            &self.trial_handle,
            Instant::now(),
        )
        .map_err(|e| DomainError::new(ErrorCode::ProductNotFound, e.to_string()))?;

        tracing::info!(products = catalog.len(), "Product catalog loaded");
        Ok(catalog)
    }
}

fn product_not_found(key: &str) -> DomainError {
    DomainError::new(
        ErrorCode::ProductNotFound,
        format!("Product '{}' is not in the catalog", key),
    )
}
