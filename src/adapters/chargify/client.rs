//! Chargify REST API adapter.
//!
//! Implements the `BillingProvider` trait over Chargify's v1 JSON API and
//! the v2 call endpoint used by Chargify Direct.
//!
//! # Conventions
//!
//! - HTTP basic auth with the API key as user and `x` as password
//! - Request and response bodies wrap resources: `{"subscription": {...}}`
//! - 404 on a lookup yields `None`, 422 carries Chargify's error list
//!
//! # Configuration
//!
//! ```ignore
//! let config = ChargifyClientConfig::new(site_url, api_key)?
//!     .with_direct_credentials(api_id, api_password);
//! let client = ChargifyClient::new(config);
//! ```

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Map, Value};
use url::Url;

use crate::domain::catalog::Product;
use crate::domain::customer::CustomerAttributes;
use crate::domain::foundation::{CustomerId, SubscriptionId};
use crate::domain::subscription::SubscriptionSnapshot;
use crate::ports::{
    BillingError, BillingProvider, CancelMode, CreateSubscriptionRequest, Customer, Metadata,
    MetadataResource, Page, PaymentCollectionMethod, PaymentProfile,
};

/// Error Chargify reports when canceling a canceled subscription.
const ALREADY_CANCELED: &str = "The subscription is already canceled";

/// Email used for subscription previews. It does not have to exist.
const PREVIEW_EMAIL: &str = "fake@email.com";

/// Chargify site configuration.
pub struct ChargifyClientConfig {
    /// Site URL, e.g. `https://acme.chargify.com`.
    site_url: Url,

    api_key: SecretString,

    /// Chargify Direct API id, also the user for v2 calls.
    direct_api_id: String,

    direct_api_password: SecretString,
}

impl ChargifyClientConfig {
    pub fn new(site_url: &str, api_key: impl Into<String>) -> Result<Self, url::ParseError> {
        let site_url = Url::parse(site_url)?;
        if site_url.cannot_be_a_base() {
            return Err(url::ParseError::RelativeUrlWithCannotBeABaseBase);
        }
        Ok(Self {
            site_url,
            api_key: SecretString::new(api_key.into()),
            direct_api_id: String::new(),
            direct_api_password: SecretString::new(String::new()),
        })
    }

    pub fn with_direct_credentials(
        mut self,
        api_id: impl Into<String>,
        api_password: impl Into<String>,
    ) -> Self {
        self.direct_api_id = api_id.into();
        self.direct_api_password = SecretString::new(api_password.into());
        self
    }
}

/// Chargify billing provider adapter.
pub struct ChargifyClient {
    config: ChargifyClientConfig,
    http_client: reqwest::Client,
}

impl ChargifyClient {
    pub fn new(config: ChargifyClientConfig) -> Self {
        Self {
            config,
            http_client: reqwest::Client::new(),
        }
    }

    /// Uses a preconfigured HTTP client (timeouts, proxies).
    pub fn with_http_client(config: ChargifyClientConfig, http_client: reqwest::Client) -> Self {
        Self {
            config,
            http_client,
        }
    }

    /// Appends `segments` to the site URL, percent-encoding each one.
    fn url(&self, segments: &[&str]) -> String {
        let mut url = self.config.site_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url.into()
    }

    fn api(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        self.http_client
            .request(method, self.url(segments))
            .basic_auth(self.config.api_key.expose_secret(), Some("x"))
            .header(reqwest::header::ACCEPT, "application/json")
    }

    async fn execute(
        &self,
        request: RequestBuilder,
        operation: &'static str,
    ) -> Result<Response, BillingError> {
        request.send().await.map_err(|e| {
            tracing::warn!(operation, error = %e, "Chargify request failed");
            BillingError::network(e.to_string())
        })
    }

    /// Sends and decodes a JSON response, mapping error statuses.
    async fn call(
        &self,
        request: RequestBuilder,
        operation: &'static str,
    ) -> Result<Value, BillingError> {
        let response = self.execute(request, operation).await?;
        read_json(response, operation).await
    }

    /// Like [`call`](Self::call) but a 404 yields `None`.
    async fn call_optional(
        &self,
        request: RequestBuilder,
        operation: &'static str,
    ) -> Result<Option<Value>, BillingError> {
        let response = self.execute(request, operation).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        read_json(response, operation).await.map(Some)
    }

    /// Sends a request whose response must be exactly 200.
    async fn call_ok(
        &self,
        request: RequestBuilder,
        operation: &'static str,
    ) -> Result<Value, BillingError> {
        let response = self.execute(request, operation).await?;
        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(operation, status = status.as_u16(), body = %body, "Chargify API error");
            return Err(BillingError::provider(
                status.as_u16(),
                format!("{} failed: {}", operation, body),
            ));
        }
        read_json(response, operation).await
    }

    async fn update_subscription_fields(
        &self,
        subscription_id: SubscriptionId,
        fields: Value,
        operation: &'static str,
    ) -> Result<Value, BillingError> {
        let request = self
            .api(
                Method::PUT,
                &["subscriptions", &format!("{}.json", subscription_id)],
            )
            .json(&json!({ "subscription": fields }));
        self.call(request, operation).await
    }

    async fn override_subscription(
        &self,
        subscription_id: SubscriptionId,
        expires_at: Value,
    ) -> Result<(), BillingError> {
        let request = self
            .api(
                Method::PUT,
                &["subscriptions", &subscription_id.to_string(), "override.json"],
            )
            .json(&json!({ "subscription": { "expires_at": expires_at } }));
        self.call(request, "override_subscription").await?;
        Ok(())
    }
}

async fn read_json(response: Response, operation: &'static str) -> Result<Value, BillingError> {
    let status = response.status();
    if !status.is_success() {
        return Err(error_from(response, operation).await);
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| BillingError::network(e.to_string()))?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(&bytes).map_err(|e| {
        tracing::error!(operation, error = %e, "Failed to parse Chargify response");
        BillingError::decode(format!("Failed to parse Chargify response: {}", e))
    })
}

async fn error_from(response: Response, operation: &'static str) -> BillingError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    match status {
        StatusCode::NOT_FOUND => BillingError::not_found(operation),
        StatusCode::UNPROCESSABLE_ENTITY => {
            let errors = parse_errors(&body);
            tracing::warn!(operation, errors = ?errors, "Chargify rejected request");
            BillingError::unprocessable(errors)
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            tracing::error!(operation, status = status.as_u16(), "Chargify authentication failed");
            BillingError::authentication(format!("{} rejected credentials", operation))
                .with_status(status.as_u16())
        }
        _ => {
            tracing::error!(operation, status = status.as_u16(), body = %body, "Chargify API error");
            BillingError::provider(status.as_u16(), format!("Chargify API error: {}", body))
        }
    }
}

/// Extracts the `errors` list of a 422 body. Chargify sends either a list of
/// strings or an object of field to messages.
fn parse_errors(body: &str) -> Vec<String> {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return if body.trim().is_empty() {
            Vec::new()
        } else {
            vec![body.trim().to_string()]
        };
    };

    let mut errors = Vec::new();
    collect_errors(value.get("errors").unwrap_or(&Value::Null), &mut errors);
    errors
}

fn collect_errors(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(message) => out.push(message.clone()),
        Value::Array(items) => items.iter().for_each(|item| collect_errors(item, out)),
        Value::Object(map) => map.values().for_each(|item| collect_errors(item, out)),
        _ => {}
    }
}

/// Unwraps `{"key": {...}}`.
fn take(mut value: Value, key: &str) -> Result<Value, BillingError> {
    match value.get_mut(key).map(Value::take) {
        Some(inner) if !inner.is_null() => Ok(inner),
        _ => Err(BillingError::decode(format!(
            "missing '{}' in Chargify response",
            key
        ))),
    }
}

/// Unwraps `[{"key": {...}}, ...]`.
fn take_list(value: Value, key: &str) -> Result<Vec<Value>, BillingError> {
    match value {
        Value::Array(items) => items.into_iter().map(|item| take(item, key)).collect(),
        Value::Null => Ok(Vec::new()),
        _ => Err(BillingError::decode(format!(
            "expected a list of '{}' in Chargify response",
            key
        ))),
    }
}

fn snapshot(value: Value) -> Result<SubscriptionSnapshot, BillingError> {
    take(value, "subscription").map(SubscriptionSnapshot::new)
}

fn product(value: Value) -> Result<Product, BillingError> {
    Product::from_provider(take(value, "product")?).map_err(|e| BillingError::decode(e.to_string()))
}

fn customer(value: Value) -> Result<Customer, BillingError> {
    serde_json::from_value(take(value, "customer")?)
        .map_err(|e| BillingError::decode(format!("Invalid customer: {}", e)))
}

fn page_query(page: Page) -> [(&'static str, String); 2] {
    [
        ("page", page.page.to_string()),
        ("per_page", page.per_page.to_string()),
    ]
}

#[async_trait]
impl BillingProvider for ChargifyClient {
    fn card_update_url(&self, subscription_id: SubscriptionId) -> String {
        self.url(&[
            "api",
            "v2",
            "subscriptions",
            &subscription_id.to_string(),
            "card_update",
        ])
    }

    fn signup_url(&self) -> String {
        self.url(&["api", "v2", "signups"])
    }

    async fn create_customer(
        &self,
        attributes: &CustomerAttributes,
    ) -> Result<Customer, BillingError> {
        let request = self
            .api(Method::POST, &["customers.json"])
            .json(&json!({ "customer": attributes }));
        customer(self.call(request, "create_customer").await?)
    }

    async fn lookup_customer_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Customer>, BillingError> {
        let request = self
            .api(Method::GET, &["customers", "lookup.json"])
            .query(&[("reference", reference)]);
        self.call_optional(request, "lookup_customer")
            .await?
            .map(customer)
            .transpose()
    }

    async fn update_customer(
        &self,
        customer_id: CustomerId,
        attributes: &CustomerAttributes,
        extra_fields: Map<String, Value>,
    ) -> Result<(), BillingError> {
        let mut fields = match serde_json::to_value(attributes) {
            Ok(Value::Object(map)) => map,
            Ok(_) | Err(_) => {
                return Err(BillingError::invalid_argument(
                    "customer attributes must serialize to an object",
                ))
            }
        };
        fields.extend(extra_fields);

        let request = self
            .api(Method::PUT, &["customers", &format!("{}.json", customer_id)])
            .json(&json!({ "customer": fields }));
        self.call(request, "update_customer").await?;
        Ok(())
    }

    async fn subscription_preview(
        &self,
        product_handle: &str,
        billing_country: &str,
        coupon_code: Option<&str>,
    ) -> Result<Value, BillingError> {
        let body = json!({
            "subscription": {
                "product_handle": product_handle,
                "coupon_code": coupon_code,
                "payment_profile_attributes": { "billing_country": billing_country },
                "customer_attributes": { "email": PREVIEW_EMAIL },
            }
        });
        let request = self
            .api(Method::POST, &["subscriptions", "preview.json"])
            .json(&body);
        let preview = take(
            self.call(request, "subscription_preview").await?,
            "subscription_preview",
        )?;

        let in_trial = preview
            .pointer("/current_billing_manifest/period_type")
            .and_then(Value::as_str)
            == Some("trial");
        let manifest = if in_trial {
            "next_billing_manifest"
        } else {
            "current_billing_manifest"
        };
        take(preview, manifest)
    }

    async fn create_subscription(
        &self,
        request: CreateSubscriptionRequest,
    ) -> Result<SubscriptionSnapshot, BillingError> {
        let mut fields = Map::new();
        fields.insert("product_handle".into(), json!(request.product_handle));
        fields.insert("customer_reference".into(), json!(request.customer_reference));
        if let Some(code) = &request.coupon_code {
            fields.insert("coupon_code".into(), json!(code));
        }
        if let Some(next_billing_at) = request.next_billing_at {
            fields.insert("next_billing_at".into(), json!(next_billing_at.to_rfc3339()));
        }
        if let Some(token) = &request.chargify_token {
            fields.insert(
                "credit_card_attributes".into(),
                json!({ "chargify_token": token }),
            );
        }

        let http_request = self
            .api(Method::POST, &["subscriptions.json"])
            .json(&json!({ "subscription": fields }));
        let created = snapshot(self.call(http_request, "create_subscription").await?)?;

        if let Some(expires_at) = request.expires_at {
            let id = created
                .id()
                .ok_or_else(|| BillingError::decode("created subscription has no id"))?;
            self.override_subscription(id, json!(expires_at.to_rfc3339()))
                .await?;
        }

        tracing::info!(
            subscription_id = ?created.id(),
            product_handle = %request.product_handle,
            "Chargify subscription created"
        );
        Ok(created)
    }

    async fn update_subscription(
        &self,
        subscription_id: SubscriptionId,
        product_handle: &str,
        next_billing_at: Option<DateTime<Utc>>,
    ) -> Result<SubscriptionSnapshot, BillingError> {
        let mut fields = json!({ "product_handle": product_handle });
        if let Some(next_billing_at) = next_billing_at {
            fields["next_billing_at"] = json!(next_billing_at.to_rfc3339());
        }
        let response = self
            .update_subscription_fields(subscription_id, fields, "update_subscription")
            .await
            .map_err(|e| {
                if e.is_unprocessable() {
                    tracing::error!(%subscription_id, error = %e, "Cannot update subscription");
                }
                e
            })?;
        snapshot(response)
    }

    async fn subscriptions_by_customer(
        &self,
        customer_id: CustomerId,
    ) -> Result<Option<Vec<SubscriptionSnapshot>>, BillingError> {
        let request = self.api(
            Method::GET,
            &["customers", &customer_id.to_string(), "subscriptions.json"],
        );
        match self.call_optional(request, "subscriptions_by_customer").await? {
            Some(list) => Ok(Some(
                take_list(list, "subscription")?
                    .into_iter()
                    .map(SubscriptionSnapshot::new)
                    .collect(),
            )),
            None => Ok(None),
        }
    }

    async fn list_subscriptions(
        &self,
        page: Page,
    ) -> Result<Vec<SubscriptionSnapshot>, BillingError> {
        let request = self
            .api(Method::GET, &["subscriptions.json"])
            .query(&page_query(page));
        let list = self.call(request, "list_subscriptions").await?;
        Ok(take_list(list, "subscription")?
            .into_iter()
            .map(SubscriptionSnapshot::new)
            .collect())
    }

    async fn get_subscription(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<Option<SubscriptionSnapshot>, BillingError> {
        let request = self.api(
            Method::GET,
            &["subscriptions", &format!("{}.json", subscription_id)],
        );
        self.call_optional(request, "get_subscription")
            .await?
            .map(snapshot)
            .transpose()
    }

    async fn hold(
        &self,
        subscription_id: SubscriptionId,
        automatically_resume_at: NaiveDate,
    ) -> Result<(), BillingError> {
        let body = json!({
            "hold": {
                "automatically_resume_at": automatically_resume_at.format("%Y-%m-%d").to_string()
            }
        });
        let request = self
            .api(
                Method::POST,
                &["subscriptions", &subscription_id.to_string(), "hold.json"],
            )
            .json(&body);
        self.call(request, "hold_subscription").await?;
        Ok(())
    }

    async fn resume(&self, subscription_id: SubscriptionId) -> Result<(), BillingError> {
        let request = self.api(
            Method::POST,
            &["subscriptions", &subscription_id.to_string(), "resume.json"],
        );
        self.call(request, "resume_subscription").await?;
        Ok(())
    }

    async fn set_product(
        &self,
        subscription_id: SubscriptionId,
        product_handle: &str,
        delayed: bool,
    ) -> Result<SubscriptionSnapshot, BillingError> {
        let fields = json!({
            "product_handle": product_handle,
            "product_change_delayed": delayed,
        });
        let updated = snapshot(
            self.update_subscription_fields(subscription_id, fields, "set_product")
                .await?,
        )?;

        let new_handle = if delayed {
            match updated.next_product_id() {
                Some(product_id) => self
                    .get_product_by_id(product_id)
                    .await?
                    .map(|p| p.handle),
                None => None,
            }
        } else {
            updated.product_handle().map(str::to_string)
        };

        if new_handle.as_deref() != Some(product_handle) {
            tracing::error!(
                %subscription_id,
                expected = %product_handle,
                actual = ?new_handle,
                "Chargify did not apply product change"
            );
            return Err(BillingError::product_mismatch(format!(
                "Unable to set new product \"{}\" for subscription {}",
                product_handle, subscription_id
            )));
        }
        Ok(updated)
    }

    async fn cancel_delayed_product_change(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<(), BillingError> {
        self.update_subscription_fields(
            subscription_id,
            json!({ "next_product_id": "" }),
            "cancel_delayed_product_change",
        )
        .await?;
        Ok(())
    }

    async fn add_coupon(
        &self,
        subscription_id: SubscriptionId,
        coupon_code: &str,
    ) -> Result<SubscriptionSnapshot, BillingError> {
        let request = self
            .api(
                Method::POST,
                &["subscriptions", &subscription_id.to_string(), "add_coupon.json"],
            )
            .query(&[("code", coupon_code)]);
        snapshot(self.call(request, "add_coupon").await?)
    }

    async fn remove_coupon(&self, subscription_id: SubscriptionId) -> Result<(), BillingError> {
        let request = self.api(
            Method::DELETE,
            &["subscriptions", &subscription_id.to_string(), "remove_coupon.json"],
        );
        // Chargify answers with a plain-text confirmation.
        let response = self.execute(request, "remove_coupon").await?;
        if !response.status().is_success() {
            return Err(error_from(response, "remove_coupon").await);
        }
        Ok(())
    }

    async fn cancel_subscription(
        &self,
        subscription_id: SubscriptionId,
        mode: CancelMode,
    ) -> Result<(), BillingError> {
        let result = match mode {
            CancelMode::Delayed => {
                self.update_subscription_fields(
                    subscription_id,
                    json!({ "cancel_at_end_of_period": true }),
                    "cancel_subscription",
                )
                .await
            }
            CancelMode::Immediate { message } => {
                let request = self
                    .api(
                        Method::DELETE,
                        &["subscriptions", &format!("{}.json", subscription_id)],
                    )
                    .json(&json!({ "subscription": { "cancellation_message": message } }));
                self.call(request, "cancel_subscription").await
            }
        };

        match result {
            Ok(_) => Ok(()),
            Err(e) if e.is_unprocessable() && e.has_error(ALREADY_CANCELED) => {
                tracing::debug!(%subscription_id, "Subscription already canceled");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn cancel_pending_cancellation(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<(), BillingError> {
        let request = self.api(
            Method::DELETE,
            &["subscriptions", &subscription_id.to_string(), "delayed_cancel.json"],
        );
        self.call(request, "cancel_pending_cancellation").await?;
        Ok(())
    }

    async fn reactivate(
        &self,
        subscription_id: SubscriptionId,
        include_trial: bool,
    ) -> Result<SubscriptionSnapshot, BillingError> {
        let include_trial = if include_trial { "1" } else { "0" };
        let request = self
            .api(
                Method::PUT,
                &["subscriptions", &subscription_id.to_string(), "reactivate.json"],
            )
            .query(&[("include_trial", include_trial)]);
        snapshot(self.call(request, "reactivate_subscription").await?)
    }

    async fn set_next_billing_at(
        &self,
        subscription_id: SubscriptionId,
        next_billing_at: DateTime<Utc>,
    ) -> Result<(), BillingError> {
        self.update_subscription_fields(
            subscription_id,
            json!({ "next_billing_at": next_billing_at.to_rfc3339() }),
            "set_next_billing_at",
        )
        .await?;
        Ok(())
    }

    async fn set_expires_at(
        &self,
        subscription_id: SubscriptionId,
        expires_at: DateTime<Utc>,
    ) -> Result<(), BillingError> {
        self.override_subscription(subscription_id, json!(expires_at.to_rfc3339()))
            .await
    }

    async fn unset_expires_at(&self, subscription_id: SubscriptionId) -> Result<(), BillingError> {
        self.override_subscription(subscription_id, json!("")).await
    }

    async fn set_payment_collection_method(
        &self,
        subscription_id: SubscriptionId,
        method: PaymentCollectionMethod,
    ) -> Result<(), BillingError> {
        self.update_subscription_fields(
            subscription_id,
            json!({ "payment_collection_method": method.as_str() }),
            "set_payment_collection_method",
        )
        .await?;
        Ok(())
    }

    async fn retry_subscription(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<(), BillingError> {
        let request = self.api(
            Method::PUT,
            &["subscriptions", &subscription_id.to_string(), "retry.json"],
        );
        self.call(request, "retry_subscription").await?;
        Ok(())
    }

    async fn create_migration(
        &self,
        subscription_id: SubscriptionId,
        product_handle: &str,
    ) -> Result<(), BillingError> {
        let body = json!({
            "migration": {
                "product_handle": product_handle,
                "include_trial": false,
                "include_initial_charge": false,
                "include_coupons": false,
                "preserve_period": false,
            }
        });
        let request = self
            .api(
                Method::POST,
                &["subscriptions", &subscription_id.to_string(), "migrations.json"],
            )
            .json(&body);
        self.call(request, "create_migration").await?;
        Ok(())
    }

    async fn purge_subscription(
        &self,
        subscription_id: SubscriptionId,
        customer_id: CustomerId,
    ) -> Result<(), BillingError> {
        let request = self
            .api(
                Method::POST,
                &["subscriptions", &subscription_id.to_string(), "purge.json"],
            )
            .query(&[("ack", customer_id.to_string())]);
        self.call(request, "purge_subscription").await?;
        tracing::info!(%subscription_id, %customer_id, "Chargify subscription purged");
        Ok(())
    }

    async fn create_payment_profile(
        &self,
        customer_id: CustomerId,
        chargify_token: &str,
    ) -> Result<PaymentProfile, BillingError> {
        let body = json!({
            "payment_profile": {
                "customer_id": customer_id,
                "chargify_token": chargify_token,
            }
        });
        let request = self.api(Method::POST, &["payment_profiles.json"]).json(&body);
        let profile = take(
            self.call(request, "create_payment_profile").await?,
            "payment_profile",
        )?;
        serde_json::from_value(profile)
            .map_err(|e| BillingError::decode(format!("Invalid payment profile: {}", e)))
    }

    async fn change_default_payment_profile(
        &self,
        subscription_id: SubscriptionId,
        payment_profile_id: i64,
    ) -> Result<(), BillingError> {
        let request = self.api(
            Method::POST,
            &[
                "subscriptions",
                &subscription_id.to_string(),
                "payment_profiles",
                &payment_profile_id.to_string(),
                "change_payment_profile.json",
            ],
        );
        self.call(request, "change_default_payment_profile").await?;
        Ok(())
    }

    async fn delete_payment_profile(
        &self,
        subscription_id: SubscriptionId,
        payment_profile_id: i64,
    ) -> Result<(), BillingError> {
        let request = self.api(
            Method::DELETE,
            &[
                "subscriptions",
                &subscription_id.to_string(),
                "payment_profiles",
                &format!("{}.json", payment_profile_id),
            ],
        );
        self.call(request, "delete_payment_profile").await?;
        Ok(())
    }

    async fn get_product_by_handle(&self, handle: &str) -> Result<Option<Product>, BillingError> {
        let request = self.api(
            Method::GET,
            &["products", "handle", &format!("{}.json", handle)],
        );
        self.call_optional(request, "get_product")
            .await?
            .map(product)
            .transpose()
    }

    async fn get_product_by_id(&self, product_id: i64) -> Result<Option<Product>, BillingError> {
        let request = self.api(Method::GET, &["products", &format!("{}.json", product_id)]);
        self.call_optional(request, "get_product")
            .await?
            .map(product)
            .transpose()
    }

    async fn product_families(&self) -> Result<Vec<Value>, BillingError> {
        let request = self.api(Method::GET, &["product_families.json"]);
        take_list(self.call(request, "product_families").await?, "product_family")
    }

    async fn family_products(&self, product_family_id: i64) -> Result<Vec<Value>, BillingError> {
        let request = self.api(
            Method::GET,
            &["product_families", &product_family_id.to_string(), "products.json"],
        );
        take_list(self.call(request, "family_products").await?, "product")
    }

    async fn get_coupon(&self, code: &str) -> Result<Option<Value>, BillingError> {
        let request = self
            .api(Method::GET, &["coupons", "find.json"])
            .query(&[("code", code)]);
        let response = self.execute(request, "get_coupon").await?;

        match response.status() {
            StatusCode::OK => take(read_json(response, "get_coupon").await?, "coupon").map(Some),
            StatusCode::NOT_FOUND => Ok(None),
            status => {
                tracing::error!(code, status = status.as_u16(), "Error retrieving Chargify coupon");
                Err(BillingError::provider(
                    status.as_u16(),
                    format!("Error retrieving Chargify coupon (code: {})", code),
                ))
            }
        }
    }

    async fn list_invoices(&self, page: Page) -> Result<Vec<Value>, BillingError> {
        let request = self
            .api(Method::GET, &["invoices.json"])
            .query(&page_query(page));
        match self.call(request, "list_invoices").await? {
            Value::Object(mut map) => match map.remove("invoices") {
                Some(Value::Array(items)) => Ok(items),
                _ => Err(BillingError::decode("missing 'invoices' in Chargify response")),
            },
            list => take_list(list, "invoice"),
        }
    }

    async fn register_payment(
        &self,
        invoice_uid: &str,
        amount_in_cents: i64,
        memo: &str,
    ) -> Result<(), BillingError> {
        let body = json!({
            "payment": { "amount_in_cents": amount_in_cents, "memo": memo }
        });
        let request = self
            .api(Method::POST, &["invoices", invoice_uid, "payments.json"])
            .json(&body);
        self.call(request, "register_payment").await?;
        Ok(())
    }

    async fn subscription_statements(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<Vec<Value>, BillingError> {
        let request = self
            .api(
                Method::GET,
                &["subscriptions", &subscription_id.to_string(), "statements.json"],
            )
            .query(&[("sort", "created_at"), ("direction", "desc")]);
        take_list(
            self.call_ok(request, "subscription_statements").await?,
            "statement",
        )
    }

    async fn get_statement(&self, statement_id: i64) -> Result<Value, BillingError> {
        let request = self.api(
            Method::GET,
            &["statements", &format!("{}.json", statement_id)],
        );
        take(self.call_ok(request, "get_statement").await?, "statement")
    }

    async fn subscription_transactions(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<Vec<Value>, BillingError> {
        let request = self.api(
            Method::GET,
            &["subscriptions", &subscription_id.to_string(), "transactions.json"],
        );
        take_list(
            self.call(request, "subscription_transactions").await?,
            "transaction",
        )
    }

    async fn get_transaction(&self, transaction_id: i64) -> Result<Value, BillingError> {
        let request = self.api(
            Method::GET,
            &["transactions", &format!("{}.json", transaction_id)],
        );
        take(self.call(request, "get_transaction").await?, "transaction")
    }

    async fn create_metadata(
        &self,
        resource: MetadataResource,
        resource_id: i64,
        metadata: Vec<Metadata>,
    ) -> Result<(), BillingError> {
        let request = self
            .api(
                Method::POST,
                &[resource.as_path(), &resource_id.to_string(), "metadata.json"],
            )
            .json(&json!({ "metadata": metadata }));
        self.call(request, "create_metadata").await?;
        Ok(())
    }

    async fn subscription_metadata(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<Vec<Metadata>, BillingError> {
        let request = self.api(
            Method::GET,
            &["subscriptions", &subscription_id.to_string(), "metadata.json"],
        );
        let metadata = take(self.call(request, "subscription_metadata").await?, "metadata")?;
        serde_json::from_value(metadata)
            .map_err(|e| BillingError::decode(format!("Invalid metadata: {}", e)))
    }

    async fn get_api_call(&self, call_id: &str) -> Result<Value, BillingError> {
        let request = self
            .http_client
            .get(self.url(&["api", "v2", "calls", call_id]))
            .basic_auth(
                &self.config.direct_api_id,
                Some(self.config.direct_api_password.expose_secret()),
            )
            .header(reqwest::header::ACCEPT, "application/json");
        let call = self.call_ok(request, "get_api_call").await.map_err(|e| {
            tracing::error!(call_id, error = %e, "Error retrieving Chargify API call");
            e
        })?;
        take(call, "call")
    }
}
