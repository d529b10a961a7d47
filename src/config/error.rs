//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid socket address: {0}")]
    InvalidSocketAddr(String),

    #[error("Invalid request timeout")]
    InvalidTimeout,

    #[error("Invalid database URL format")]
    InvalidDatabaseUrl,

    #[error("Pool min_connections exceeds max_connections")]
    InvalidPoolSize,

    #[error("Pool size exceeds maximum allowed (100)")]
    PoolSizeTooLarge,

    #[error("Chargify site URL must be an absolute http(s) URL")]
    InvalidSiteUrl,

    #[error("Chargify site URL must use HTTPS in production")]
    SiteUrlMustBeHttps,

    #[error("Chargify Direct credentials are incomplete")]
    IncompleteDirectCredentials,

    #[error("Nonce TTL must be positive")]
    InvalidNonceTtl,

    #[error("Catalog refresh interval must be positive")]
    InvalidRefreshInterval,

    #[error("Invalid product handle: {0}")]
    InvalidProductHandle(String),
}
