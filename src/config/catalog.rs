//! Product catalog configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Which Chargify products the application sells.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    /// Paying product handles (comma-separated, display order)
    pub paying_product_handles: String,

    pub trial_product_handle: String,

    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
}

impl CatalogConfig {
    pub fn paying_handles(&self) -> Vec<String> {
        self.paying_product_handles
            .split(',')
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let paying = self.paying_handles();
        if paying.is_empty() {
            return Err(ValidationError::MissingRequired(
                "CATALOG__PAYING_PRODUCT_HANDLES",
            ));
        }
        if self.trial_product_handle.trim().is_empty() {
            return Err(ValidationError::MissingRequired("CATALOG__TRIAL_PRODUCT_HANDLE"));
        }
        if let Some(bad) = paying
            .iter()
            .chain(std::iter::once(&self.trial_product_handle))
            .find(|h| h.chars().any(char::is_whitespace))
        {
            return Err(ValidationError::InvalidProductHandle(bad.clone()));
        }
        if self.refresh_interval_secs == 0 {
            return Err(ValidationError::InvalidRefreshInterval);
        }
        Ok(())
    }
}

fn default_refresh_interval() -> u64 {
    crate::domain::catalog::DEFAULT_REFRESH_INTERVAL.as_secs()
}
