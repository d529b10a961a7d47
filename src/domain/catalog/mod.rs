//! Chargify product catalog.

#[allow(clippy::module_inception)]
mod catalog;
mod product;

pub use catalog::{CatalogError, ProductCatalog, DEFAULT_REFRESH_INTERVAL};
pub use product::Product;
