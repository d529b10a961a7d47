//! Chargify configuration

use serde::Deserialize;

use super::error::ValidationError;
use crate::domain::direct::DEFAULT_NONCE_TTL_SECS;

/// Chargify site credentials and integration settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChargifyConfig {
    /// REST API key (basic auth user, password `x`)
    pub api_key: String,

    /// Site URL, e.g. `https://acme.chargify.com`
    pub site_url: String,

    /// Chargify Direct API id
    #[serde(default)]
    pub direct_api_id: String,

    /// Chargify Direct secret used for HMAC signatures
    #[serde(default)]
    pub direct_api_secret: String,

    /// Chargify Direct password, used to read API calls
    #[serde(default)]
    pub direct_api_password: String,

    /// Site shared key signing webhooks. Empty disables verification.
    #[serde(default)]
    pub webhook_shared_key: String,

    /// Last name sent for users without one
    #[serde(default = "default_last_name")]
    pub default_last_name: String,

    #[serde(default = "default_nonce_ttl")]
    pub nonce_ttl_secs: i64,

    /// Token of the trial coupon applied when none is given
    pub trial_default_token: Option<String>,
}

impl ChargifyConfig {
    /// Direct flow is enabled once its credentials are set.
    pub fn direct_enabled(&self) -> bool {
        !self.direct_api_id.is_empty()
    }

    pub fn verifies_webhooks(&self) -> bool {
        !self.webhook_shared_key.is_empty()
    }

    pub fn nonce_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.nonce_ttl_secs)
    }

    /// Validate Chargify configuration. Production sites must use HTTPS.
    pub fn validate(&self, production: bool) -> Result<(), ValidationError> {
        if self.api_key.is_empty() {
            return Err(ValidationError::MissingRequired("CHARGIFY__API_KEY"));
        }
        if self.site_url.is_empty() {
            return Err(ValidationError::MissingRequired("CHARGIFY__SITE_URL"));
        }

        let url = url::Url::parse(&self.site_url).map_err(|_| ValidationError::InvalidSiteUrl)?;
        match url.scheme() {
            "https" => {}
            "http" if !production => {}
            "http" => return Err(ValidationError::SiteUrlMustBeHttps),
            _ => return Err(ValidationError::InvalidSiteUrl),
        }

        let direct = [
            &self.direct_api_id,
            &self.direct_api_secret,
            &self.direct_api_password,
        ];
        let set = direct.iter().filter(|v| !v.is_empty()).count();
        if set != 0 && set != direct.len() {
            return Err(ValidationError::IncompleteDirectCredentials);
        }

        if self.nonce_ttl_secs <= 0 {
            return Err(ValidationError::InvalidNonceTtl);
        }
        Ok(())
    }
}

fn default_last_name() -> String {
    "-".to_string()
}

fn default_nonce_ttl() -> i64 {
    DEFAULT_NONCE_TTL_SECS
}
