//! Billing provider port for the Chargify REST API.
//!
//! Every call the application makes to Chargify goes through this trait.
//! Semi-structured resources (statements, invoices, transactions, API calls)
//! are returned as raw JSON; subscriptions come back as
//! [`SubscriptionSnapshot`]s so they can be cached as-is.
//!
//! # Design
//!
//! - **Lookups return `Option`**: a 404 on a read means "absent", not an error
//! - **No retries**: failures are propagated with `retryable` set for the caller

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::catalog::Product;
use crate::domain::customer::CustomerAttributes;
use crate::domain::foundation::{CustomerId, DomainError, ErrorCode, SubscriptionId};
use crate::domain::subscription::SubscriptionSnapshot;

/// Default page size for paginated listings.
pub const DEFAULT_PER_PAGE: u32 = 200;

/// Port for Chargify integrations.
#[async_trait]
pub trait BillingProvider: Send + Sync {
    // ─── Hosted URLs ────────────────────────────────────────────────

    /// Chargify Direct card update endpoint for a subscription.
    fn card_update_url(&self, subscription_id: SubscriptionId) -> String;

    /// Chargify Direct signup endpoint.
    fn signup_url(&self) -> String;

    // ─── Customers ──────────────────────────────────────────────────

    async fn create_customer(&self, attributes: &CustomerAttributes)
        -> Result<Customer, BillingError>;

    /// Finds a customer by its reference (the local user id).
    async fn lookup_customer_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Customer>, BillingError>;

    /// Updates a customer. `extra_fields` are merged over `attributes`.
    async fn update_customer(
        &self,
        customer_id: CustomerId,
        attributes: &CustomerAttributes,
        extra_fields: Map<String, Value>,
    ) -> Result<(), BillingError>;

    // ─── Subscriptions ──────────────────────────────────────────────

    /// Returns the billing manifest a signup would produce: the next
    /// manifest when the product starts with a trial, the current one
    /// otherwise.
    async fn subscription_preview(
        &self,
        product_handle: &str,
        billing_country: &str,
        coupon_code: Option<&str>,
    ) -> Result<Value, BillingError>;

    /// Creates a subscription. When `expires_at` is set it is applied with a
    /// second override call.
    async fn create_subscription(
        &self,
        request: CreateSubscriptionRequest,
    ) -> Result<SubscriptionSnapshot, BillingError>;

    async fn update_subscription(
        &self,
        subscription_id: SubscriptionId,
        product_handle: &str,
        next_billing_at: Option<DateTime<Utc>>,
    ) -> Result<SubscriptionSnapshot, BillingError>;

    /// Subscriptions of a customer, `None` if the customer is unknown.
    async fn subscriptions_by_customer(
        &self,
        customer_id: CustomerId,
    ) -> Result<Option<Vec<SubscriptionSnapshot>>, BillingError>;

    async fn list_subscriptions(&self, page: Page)
        -> Result<Vec<SubscriptionSnapshot>, BillingError>;

    async fn get_subscription(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<Option<SubscriptionSnapshot>, BillingError>;

    /// The `product` object of a subscription.
    async fn get_subscription_product(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<Option<Value>, BillingError> {
        Ok(self
            .get_subscription(subscription_id)
            .await?
            .and_then(|s| s.product().cloned())
            .map(Value::Object))
    }

    async fn hold(
        &self,
        subscription_id: SubscriptionId,
        automatically_resume_at: NaiveDate,
    ) -> Result<(), BillingError>;

    async fn resume(&self, subscription_id: SubscriptionId) -> Result<(), BillingError>;

    /// Changes the product. The resulting product handle (or, for a delayed
    /// change, the next product's handle) must equal `product_handle`.
    async fn set_product(
        &self,
        subscription_id: SubscriptionId,
        product_handle: &str,
        delayed: bool,
    ) -> Result<SubscriptionSnapshot, BillingError>;

    async fn cancel_delayed_product_change(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<(), BillingError>;

    async fn add_coupon(
        &self,
        subscription_id: SubscriptionId,
        coupon_code: &str,
    ) -> Result<SubscriptionSnapshot, BillingError>;

    async fn remove_coupon(&self, subscription_id: SubscriptionId) -> Result<(), BillingError>;

    /// Cancels a subscription. Cancelling an already canceled subscription
    /// succeeds.
    async fn cancel_subscription(
        &self,
        subscription_id: SubscriptionId,
        mode: CancelMode,
    ) -> Result<(), BillingError>;

    /// Removes a delayed cancellation.
    async fn cancel_pending_cancellation(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<(), BillingError>;

    async fn reactivate(
        &self,
        subscription_id: SubscriptionId,
        include_trial: bool,
    ) -> Result<SubscriptionSnapshot, BillingError>;

    async fn set_next_billing_at(
        &self,
        subscription_id: SubscriptionId,
        next_billing_at: DateTime<Utc>,
    ) -> Result<(), BillingError>;

    async fn set_expires_at(
        &self,
        subscription_id: SubscriptionId,
        expires_at: DateTime<Utc>,
    ) -> Result<(), BillingError>;

    async fn unset_expires_at(&self, subscription_id: SubscriptionId) -> Result<(), BillingError>;

    async fn set_payment_collection_method(
        &self,
        subscription_id: SubscriptionId,
        method: PaymentCollectionMethod,
    ) -> Result<(), BillingError>;

    async fn retry_subscription(&self, subscription_id: SubscriptionId)
        -> Result<(), BillingError>;

    /// Migrates to another product without trial, initial charge, coupons or
    /// period preservation.
    async fn create_migration(
        &self,
        subscription_id: SubscriptionId,
        product_handle: &str,
    ) -> Result<(), BillingError>;

    /// Permanently removes a subscription. Chargify requires the customer id
    /// as acknowledgement.
    async fn purge_subscription(
        &self,
        subscription_id: SubscriptionId,
        customer_id: CustomerId,
    ) -> Result<(), BillingError>;

    // ─── Payment profiles ───────────────────────────────────────────

    /// Creates a payment profile from a Chargify.js token.
    async fn create_payment_profile(
        &self,
        customer_id: CustomerId,
        chargify_token: &str,
    ) -> Result<PaymentProfile, BillingError>;

    async fn change_default_payment_profile(
        &self,
        subscription_id: SubscriptionId,
        payment_profile_id: i64,
    ) -> Result<(), BillingError>;

    /// Creates a payment profile and makes it the subscription default.
    async fn create_default_payment_profile(
        &self,
        subscription_id: SubscriptionId,
        customer_id: CustomerId,
        chargify_token: &str,
    ) -> Result<PaymentProfile, BillingError> {
        let profile = self.create_payment_profile(customer_id, chargify_token).await?;
        self.change_default_payment_profile(subscription_id, profile.id)
            .await?;
        Ok(profile)
    }

    async fn delete_payment_profile(
        &self,
        subscription_id: SubscriptionId,
        payment_profile_id: i64,
    ) -> Result<(), BillingError>;

    // ─── Products & coupons ─────────────────────────────────────────

    async fn get_product_by_handle(&self, handle: &str) -> Result<Option<Product>, BillingError>;

    async fn get_product_by_id(&self, product_id: i64) -> Result<Option<Product>, BillingError>;

    /// Products for `handles`, skipping unknown ones.
    async fn get_products(&self, handles: &[String]) -> Result<Vec<Product>, BillingError> {
        let mut products = Vec::with_capacity(handles.len());
        for handle in handles {
            if let Some(product) = self.get_product_by_handle(handle).await? {
                products.push(product);
            }
        }
        Ok(products)
    }

    async fn product_families(&self) -> Result<Vec<Value>, BillingError>;

    async fn family_products(&self, product_family_id: i64) -> Result<Vec<Value>, BillingError>;

    async fn get_coupon(&self, code: &str) -> Result<Option<Value>, BillingError>;

    // ─── Invoices, statements, transactions ─────────────────────────

    async fn list_invoices(&self, page: Page) -> Result<Vec<Value>, BillingError>;

    async fn register_payment(
        &self,
        invoice_uid: &str,
        amount_in_cents: i64,
        memo: &str,
    ) -> Result<(), BillingError>;

    /// Statements of a subscription, newest first.
    async fn subscription_statements(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<Vec<Value>, BillingError>;

    async fn get_statement(&self, statement_id: i64) -> Result<Value, BillingError>;

    async fn subscription_transactions(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<Vec<Value>, BillingError>;

    async fn get_transaction(&self, transaction_id: i64) -> Result<Value, BillingError>;

    // ─── Metadata ───────────────────────────────────────────────────

    async fn create_metadata(
        &self,
        resource: MetadataResource,
        resource_id: i64,
        metadata: Vec<Metadata>,
    ) -> Result<(), BillingError>;

    async fn subscription_metadata(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<Vec<Metadata>, BillingError>;

    // ─── Chargify Direct ────────────────────────────────────────────

    /// Fetches a v2 API call record with the Direct credentials.
    async fn get_api_call(&self, call_id: &str) -> Result<Value, BillingError>;
}

/// Chargify customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub organization: Option<String>,
    /// Remaining provider fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Request to create a subscription.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreateSubscriptionRequest {
    /// Customer reference (the local user id).
    pub customer_reference: String,
    pub product_handle: String,
    pub coupon_code: Option<String>,
    pub next_billing_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Chargify.js token for the initial payment profile.
    pub chargify_token: Option<String>,
}

/// Page selector for listings. Pages start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub per_page: u32,
}

impl Page {
    pub fn first() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }

    pub fn next(self) -> Self {
        Self {
            page: self.page + 1,
            ..self
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::first()
    }
}

/// How a subscription is canceled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelMode {
    /// Cancel at the end of the current period.
    Delayed,
    /// Cancel now, with an optional cancellation message.
    Immediate { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentCollectionMethod {
    Automatic,
    Invoice,
}

impl PaymentCollectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentCollectionMethod::Automatic => "automatic",
            PaymentCollectionMethod::Invoice => "invoice",
        }
    }
}

impl std::str::FromStr for PaymentCollectionMethod {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "automatic" => Ok(PaymentCollectionMethod::Automatic),
            "invoice" => Ok(PaymentCollectionMethod::Invoice),
            other => Err(BillingError::invalid_argument(format!(
                "payment collection method must be 'automatic' or 'invoice', got '{}'",
                other
            ))),
        }
    }
}

/// Chargify payment profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentProfile {
    pub id: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Resource kinds that carry Chargify metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataResource {
    Subscriptions,
    Customers,
}

impl MetadataResource {
    pub fn as_path(&self) -> &'static str {
        match self {
            MetadataResource::Subscriptions => "subscriptions",
            MetadataResource::Customers => "customers",
        }
    }
}

/// Custom field value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub name: String,
    pub value: String,
}

/// Errors from billing provider operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingError {
    /// Error code for categorization.
    pub code: BillingErrorCode,

    /// Human-readable message.
    pub message: String,

    /// Error messages returned by Chargify.
    pub errors: Vec<String>,

    /// HTTP status of the failed call, if any.
    pub status: Option<u16>,

    /// Whether the operation can be retried.
    pub retryable: bool,
}

impl BillingError {
    pub fn new(code: BillingErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            errors: Vec::new(),
            status: None,
            retryable: code.is_retryable(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn not_found(resource: &str) -> Self {
        Self::new(BillingErrorCode::NotFound, format!("{} not found", resource)).with_status(404)
    }

    /// A 422 with Chargify's error list.
    pub fn unprocessable(errors: Vec<String>) -> Self {
        let message = if errors.is_empty() {
            "Unprocessable entity".to_string()
        } else {
            errors.join("; ")
        };
        Self {
            errors,
            ..Self::new(BillingErrorCode::Unprocessable, message).with_status(422)
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(BillingErrorCode::NetworkError, message)
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(BillingErrorCode::AuthenticationError, message)
    }

    /// Any other unexpected provider response.
    pub fn provider(status: u16, message: impl Into<String>) -> Self {
        let mut err = Self::new(BillingErrorCode::ProviderError, message).with_status(status);
        err.retryable = status >= 500;
        err
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(BillingErrorCode::DecodeError, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(BillingErrorCode::InvalidArgument, message)
    }

    pub fn product_mismatch(message: impl Into<String>) -> Self {
        Self::new(BillingErrorCode::ProductMismatch, message)
    }

    pub fn is_unprocessable(&self) -> bool {
        self.code == BillingErrorCode::Unprocessable
    }

    /// True if Chargify reported exactly `message` among its errors.
    pub fn has_error(&self, message: &str) -> bool {
        self.errors.iter().any(|e| e == message)
    }
}

impl std::fmt::Display for BillingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for BillingError {}

impl From<BillingError> for DomainError {
    fn from(err: BillingError) -> Self {
        let code = match err.code {
            BillingErrorCode::Unprocessable => ErrorCode::PaymentRejected,
            BillingErrorCode::NotFound => ErrorCode::SubscriptionNotFound,
            BillingErrorCode::InvalidArgument => ErrorCode::ValidationFailed,
            _ => ErrorCode::BillingProviderError,
        };

        let mut domain = DomainError::new(code, err.message);
        if let Some(status) = err.status {
            domain = domain.with_detail("status", status.to_string());
        }
        domain
    }
}

/// Billing error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingErrorCode {
    NotFound,
    Unprocessable,
    NetworkError,
    AuthenticationError,
    ProviderError,
    DecodeError,
    InvalidArgument,
    ProductMismatch,
}

impl BillingErrorCode {
    pub fn is_retryable(&self) -> bool {
        matches!(self, BillingErrorCode::NetworkError)
    }
}

impl std::fmt::Display for BillingErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BillingErrorCode::NotFound => "not_found",
            BillingErrorCode::Unprocessable => "unprocessable_entity",
            BillingErrorCode::NetworkError => "network_error",
            BillingErrorCode::AuthenticationError => "authentication_error",
            BillingErrorCode::ProviderError => "provider_error",
            BillingErrorCode::DecodeError => "decode_error",
            BillingErrorCode::InvalidArgument => "invalid_argument",
            BillingErrorCode::ProductMismatch => "product_mismatch",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unprocessable_keeps_provider_errors() {
        let err = BillingError::unprocessable(vec![
            "The subscription is already canceled".into(),
            "Other".into(),
        ]);
        assert!(err.is_unprocessable());
        assert!(err.has_error("The subscription is already canceled"));
        assert!(!err.has_error("already canceled"));
        assert_eq!(err.status, Some(422));
        assert_eq!(
            err.to_string(),
            "unprocessable_entity: The subscription is already canceled; Other"
        );
    }

    #[test]
    fn only_network_and_server_errors_are_retryable() {
        assert!(BillingError::network("timeout").retryable);
        assert!(BillingError::provider(503, "unavailable").retryable);
        assert!(!BillingError::provider(400, "bad").retryable);
        assert!(!BillingError::unprocessable(vec![]).retryable);
    }

    #[test]
    fn converts_to_domain_error() {
        let domain: DomainError = BillingError::unprocessable(vec!["declined".into()]).into();
        assert_eq!(domain.code, ErrorCode::PaymentRejected);
        assert_eq!(domain.details.get("status").map(String::as_str), Some("422"));

        let domain: DomainError = BillingError::network("down").into();
        assert_eq!(domain.code, ErrorCode::BillingProviderError);
    }

    #[test]
    fn payment_collection_method_parses_known_values() {
        assert_eq!(
            "automatic".parse::<PaymentCollectionMethod>().unwrap(),
            PaymentCollectionMethod::Automatic
        );
        assert_eq!(PaymentCollectionMethod::Invoice.as_str(), "invoice");
        let err = "manual".parse::<PaymentCollectionMethod>().unwrap_err();
        assert_eq!(err.code, BillingErrorCode::InvalidArgument);
    }

    #[test]
    fn pages_advance_from_one() {
        let page = Page::first();
        assert_eq!(page.page, 1);
        assert_eq!(page.per_page, DEFAULT_PER_PAGE);
        assert_eq!(page.next().page, 2);
    }

    #[test]
    fn customer_keeps_unknown_fields() {
        let customer: Customer = serde_json::from_value(serde_json::json!({
            "id": 7,
            "reference": "42",
            "email": "jane@example.com",
            "cc_emails": null
        }))
        .unwrap();
        assert_eq!(customer.id, CustomerId::new(7));
        assert!(customer.extra.contains_key("cc_emails"));
    }
}
