//! Product catalog cache.

mod product_catalog_service;

pub use product_catalog_service::ProductCatalogService;
