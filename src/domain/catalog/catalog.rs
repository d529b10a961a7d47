//! Snapshot of the Chargify product catalog.
//!
//! Built wholesale from every product of every product family; callers
//! decide when it is outdated and rebuild it rather than patching entries.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use thiserror::Error;

use super::Product;

/// Default time before the catalog is reloaded (20 minutes).
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(20 * 60);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    /// A configured handle is absent from Chargify.
    #[error("Product '{0}' is not in the Chargify catalog")]
    MissingProduct(String),
}

/// Products keyed by handle, with the configured paying and trial products.
#[derive(Debug, Clone)]
pub struct ProductCatalog {
    products: HashMap<String, Product>,
    paying: Vec<String>,
    trial: String,
    loaded_at: Instant,
}

impl ProductCatalog {
    /// Indexes `products` by handle and resolves the configured handles.
    ///
    /// `paying_handles` order is kept as the display order.
    pub fn build(
        products: Vec<Product>,
        paying_handles: &[String],
        trial_handle: &str,
        loaded_at: Instant,
    ) -> Result<Self, CatalogError> {
        let products: HashMap<String, Product> = products
            .into_iter()
            .map(|p| (p.handle.clone(), p))
            .collect();

        for handle in paying_handles
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(trial_handle))
        {
            if !products.contains_key(handle) {
                return Err(CatalogError::MissingProduct(handle.to_string()));
            }
        }

        Ok(Self {
            products,
            paying: paying_handles.to_vec(),
            trial: trial_handle.to_string(),
            loaded_at,
        })
    }

    pub fn loaded_at(&self) -> Instant {
        self.loaded_at
    }

    /// Older than `refresh_interval`.
    pub fn is_outdated(&self, now: Instant, refresh_interval: Duration) -> bool {
        now.saturating_duration_since(self.loaded_at) > refresh_interval
    }

    pub fn get(&self, handle: &str) -> Option<&Product> {
        self.products.get(handle)
    }

    pub fn get_by_id(&self, product_id: i64) -> Option<&Product> {
        self.products.values().find(|p| p.id == product_id)
    }

    /// Paying products in configured order.
    pub fn paying(&self) -> Vec<&Product> {
        self.paying
            .iter()
            .filter_map(|h| self.products.get(h))
            .collect()
    }

    pub fn trial(&self) -> Option<&Product> {
        self.products.get(&self.trial)
    }

    pub fn products(&self) -> impl Iterator<Item = &Product> {
        self.products.values()
    }

    pub fn handles(&self) -> impl Iterator<Item = &str> {
        self.products.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn product(id: i64, handle: &str, interval: i64) -> Product {
        Product::from_provider(json!({
            "id": id, "handle": handle, "name": handle,
            "interval": interval, "interval_unit": "month"
        }))
        .unwrap()
    }

    fn catalog() -> ProductCatalog {
        ProductCatalog::build(
            vec![product(1, "monthly", 1), product(2, "yearly", 12), product(3, "trial", 1)],
            &["yearly".to_string(), "monthly".to_string()],
            "trial",
            Instant::now(),
        )
        .unwrap()
    }

    #[test]
    fn paying_products_keep_configured_order() {
        let catalog = catalog();
        let handles: Vec<_> = catalog.paying().iter().map(|p| p.handle.as_str()).collect();
        assert_eq!(handles, vec!["yearly", "monthly"]);
        assert_eq!(catalog.trial().map(|p| p.id), Some(3));
    }

    #[test]
    fn lookup_by_handle_and_id() {
        let catalog = catalog();
        assert_eq!(catalog.get("yearly").map(|p| p.id), Some(2));
        assert_eq!(catalog.get_by_id(1).map(|p| p.handle.as_str()), Some("monthly"));
        assert!(catalog.get_by_id(99).is_none());
        assert_eq!(catalog.len(), 3);
    }

    #[test]
    fn missing_configured_handle_fails() {
        let result = ProductCatalog::build(
            vec![product(1, "monthly", 1)],
            &["monthly".to_string()],
            "trial",
            Instant::now(),
        );
        assert_eq!(
            result.unwrap_err(),
            CatalogError::MissingProduct("trial".to_string())
        );
    }

    #[test]
    fn outdated_after_refresh_interval() {
        let catalog = catalog();
        let loaded = catalog.loaded_at();
        assert!(!catalog.is_outdated(loaded + Duration::from_secs(60), DEFAULT_REFRESH_INTERVAL));
        assert!(!catalog.is_outdated(loaded + DEFAULT_REFRESH_INTERVAL, DEFAULT_REFRESH_INTERVAL));
        assert!(catalog.is_outdated(
            loaded + DEFAULT_REFRESH_INTERVAL + Duration::from_secs(1),
            DEFAULT_REFRESH_INTERVAL
        ));
    }
}
