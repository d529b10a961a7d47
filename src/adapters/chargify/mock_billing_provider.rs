//! Mock billing provider for testing.
//!
//! Provides a configurable in-memory implementation of `BillingProvider` for
//! unit and integration tests. Supports:
//! - Pre-configured customers, subscriptions, products and API calls
//! - Error injection
//! - Call tracking

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{json, Map, Value};

use crate::domain::catalog::Product;
use crate::domain::customer::CustomerAttributes;
use crate::domain::foundation::{CustomerId, SubscriptionId};
use crate::domain::subscription::SubscriptionSnapshot;
use crate::ports::{
    BillingError, BillingProvider, CancelMode, CreateSubscriptionRequest, Customer, Metadata,
    MetadataResource, Page, PaymentCollectionMethod, PaymentProfile,
};

const SITE_URL: &str = "https://mock.chargify.test";

/// Mock billing provider for testing.
///
/// # Example
///
/// ```ignore
/// let mock = MockBillingProvider::new();
/// mock.add_subscription(snapshot);
/// mock.set_method_error("reactivate", BillingError::unprocessable(vec!["declined".into()]));
/// ```
#[derive(Default)]
pub struct MockBillingProvider {
    inner: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    /// Customers keyed by reference.
    customers: HashMap<String, Customer>,

    subscriptions: HashMap<SubscriptionId, SubscriptionSnapshot>,

    /// Products keyed by handle.
    products: HashMap<String, Product>,

    /// Product families with their raw product objects.
    families: Vec<(Value, Vec<Value>)>,

    coupons: HashMap<String, Value>,

    api_calls: HashMap<String, Value>,

    metadata: HashMap<SubscriptionId, Vec<Metadata>>,

    next_id: i64,

    /// Error to return on next call.
    next_error: Option<BillingError>,

    /// Specific errors by method name.
    method_errors: HashMap<String, BillingError>,

    call_log: Vec<MethodCall>,
}

impl MockState {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        1000 + self.next_id
    }

    fn subscription_mut(
        &mut self,
        subscription_id: SubscriptionId,
    ) -> Result<&mut SubscriptionSnapshot, BillingError> {
        self.subscriptions
            .get_mut(&subscription_id)
            .ok_or_else(|| BillingError::not_found("subscription"))
    }
}

/// Recorded method call for assertions.
#[derive(Debug, Clone)]
pub struct MethodCall {
    pub method: String,
    pub args: Vec<String>,
}

impl MockBillingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Configuration Methods
    // ════════════════════════════════════════════════════════════════════════════

    pub fn add_customer(&self, customer: Customer) {
        let reference = customer.reference.clone().unwrap_or_default();
        self.inner.lock().unwrap().customers.insert(reference, customer);
    }

    /// Adds a subscription; the snapshot must carry an `id`.
    pub fn add_subscription(&self, snapshot: SubscriptionSnapshot) {
        if let Some(id) = snapshot.id() {
            self.inner.lock().unwrap().subscriptions.insert(id, snapshot);
        }
    }

    pub fn add_product(&self, product: Product) {
        self.inner
            .lock()
            .unwrap()
            .products
            .insert(product.handle.clone(), product);
    }

    /// Adds a product family and its raw product objects.
    pub fn add_family(&self, family: Value, products: Vec<Value>) {
        let mut state = self.inner.lock().unwrap();
        for raw in &products {
            if let Ok(product) = Product::from_provider(raw.clone()) {
                state.products.insert(product.handle.clone(), product);
            }
        }
        state.families.push((family, products));
    }

    pub fn add_coupon(&self, code: &str, coupon: Value) {
        self.inner
            .lock()
            .unwrap()
            .coupons
            .insert(code.to_string(), coupon);
    }

    /// Registers the `call` object returned for a Chargify Direct call id.
    pub fn add_api_call(&self, call_id: &str, call: Value) {
        self.inner
            .lock()
            .unwrap()
            .api_calls
            .insert(call_id.to_string(), call);
    }

    /// Current stored snapshot of a subscription.
    pub fn subscription(&self, subscription_id: SubscriptionId) -> Option<SubscriptionSnapshot> {
        self.inner
            .lock()
            .unwrap()
            .subscriptions
            .get(&subscription_id)
            .cloned()
    }

    /// Set an error to return on the next call to any method.
    pub fn set_error(&self, error: BillingError) {
        self.inner.lock().unwrap().next_error = Some(error);
    }

    /// Set an error for a specific method.
    pub fn set_method_error(&self, method: &str, error: BillingError) {
        self.inner
            .lock()
            .unwrap()
            .method_errors
            .insert(method.to_string(), error);
    }

    pub fn clear_errors(&self) {
        let mut state = self.inner.lock().unwrap();
        state.next_error = None;
        state.method_errors.clear();
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Call Tracking
    // ════════════════════════════════════════════════════════════════════════════

    pub fn calls(&self) -> Vec<MethodCall> {
        self.inner.lock().unwrap().call_log.clone()
    }

    pub fn was_called(&self, method: &str) -> bool {
        self.call_count(method) > 0
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .call_log
            .iter()
            .filter(|c| c.method == method)
            .count()
    }

    /// Arguments of the last call to `method`.
    pub fn last_args(&self, method: &str) -> Option<Vec<String>> {
        self.inner
            .lock()
            .unwrap()
            .call_log
            .iter()
            .rev()
            .find(|c| c.method == method)
            .map(|c| c.args.clone())
    }

    pub fn clear_calls(&self) {
        self.inner.lock().unwrap().call_log.clear();
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Internal Helpers
    // ════════════════════════════════════════════════════════════════════════════

    fn enter(&self, method: &str, args: Vec<String>) -> Result<(), BillingError> {
        let mut state = self.inner.lock().unwrap();
        state.call_log.push(MethodCall {
            method: method.to_string(),
            args,
        });

        if let Some(error) = state.method_errors.get(method) {
            return Err(error.clone());
        }
        if let Some(error) = state.next_error.take() {
            return Err(error);
        }
        Ok(())
    }

    fn update<F>(&self, subscription_id: SubscriptionId, f: F) -> Result<SubscriptionSnapshot, BillingError>
    where
        F: FnOnce(&mut SubscriptionSnapshot),
    {
        let mut state = self.inner.lock().unwrap();
        let snapshot = state.subscription_mut(subscription_id)?;
        f(snapshot);
        Ok(snapshot.clone())
    }
}

impl Clone for MockBillingProvider {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

fn product_json(handle: &str, product: Option<&Product>) -> Value {
    match product {
        Some(p) => json!({
            "id": p.id,
            "handle": p.handle,
            "name": p.name,
            "price_in_cents": p.price_in_cents,
            "interval": p.interval,
            "interval_unit": p.interval_unit,
        }),
        None => json!({ "handle": handle }),
    }
}

#[async_trait]
impl BillingProvider for MockBillingProvider {
    fn card_update_url(&self, subscription_id: SubscriptionId) -> String {
        format!("{}/api/v2/subscriptions/{}/card_update", SITE_URL, subscription_id)
    }

    fn signup_url(&self) -> String {
        format!("{}/api/v2/signups", SITE_URL)
    }

    async fn create_customer(
        &self,
        attributes: &CustomerAttributes,
    ) -> Result<Customer, BillingError> {
        self.enter("create_customer", vec![attributes.email.clone()])?;
        let mut state = self.inner.lock().unwrap();
        let customer = Customer {
            id: CustomerId::new(state.allocate_id()),
            reference: attributes.reference.clone(),
            first_name: Some(attributes.first_name.clone()),
            last_name: Some(attributes.last_name.clone()),
            email: Some(attributes.email.clone()),
            organization: attributes.organization.clone(),
            extra: Map::new(),
        };
        state.customers.insert(
            attributes.reference.clone().unwrap_or_default(),
            customer.clone(),
        );
        Ok(customer)
    }

    async fn lookup_customer_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Customer>, BillingError> {
        self.enter("lookup_customer_by_reference", vec![reference.to_string()])?;
        Ok(self.inner.lock().unwrap().customers.get(reference).cloned())
    }

    async fn update_customer(
        &self,
        customer_id: CustomerId,
        attributes: &CustomerAttributes,
        extra_fields: Map<String, Value>,
    ) -> Result<(), BillingError> {
        let mut args = vec![
            customer_id.to_string(),
            attributes.first_name.clone(),
            attributes.last_name.clone(),
            attributes.email.clone(),
        ];
        args.extend(extra_fields.iter().map(|(k, v)| format!("{}={}", k, v)));
        self.enter("update_customer", args)?;

        let mut state = self.inner.lock().unwrap();
        let customer = state
            .customers
            .values_mut()
            .find(|c| c.id == customer_id)
            .ok_or_else(|| BillingError::not_found("customer"))?;
        customer.first_name = Some(attributes.first_name.clone());
        customer.last_name = Some(attributes.last_name.clone());
        customer.email = Some(attributes.email.clone());
        customer.organization = attributes.organization.clone();
        customer.extra.extend(extra_fields);
        Ok(())
    }

    async fn subscription_preview(
        &self,
        product_handle: &str,
        billing_country: &str,
        coupon_code: Option<&str>,
    ) -> Result<Value, BillingError> {
        self.enter(
            "subscription_preview",
            vec![
                product_handle.to_string(),
                billing_country.to_string(),
                coupon_code.unwrap_or_default().to_string(),
            ],
        )?;
        let state = self.inner.lock().unwrap();
        let total = state
            .products
            .get(product_handle)
            .and_then(|p| p.price_in_cents)
            .unwrap_or_default();
        Ok(json!({ "period_type": "recurring", "total_in_cents": total }))
    }

    async fn create_subscription(
        &self,
        request: CreateSubscriptionRequest,
    ) -> Result<SubscriptionSnapshot, BillingError> {
        self.enter(
            "create_subscription",
            vec![
                request.customer_reference.clone(),
                request.product_handle.clone(),
                request.coupon_code.clone().unwrap_or_default(),
            ],
        )?;

        let mut state = self.inner.lock().unwrap();
        let id = state.allocate_id();
        let customer = state
            .customers
            .get(&request.customer_reference)
            .map(|c| json!({ "id": c.id, "reference": c.reference, "email": c.email }))
            .unwrap_or_else(|| json!({ "reference": request.customer_reference }));
        let product = product_json(
            &request.product_handle,
            state.products.get(&request.product_handle),
        );

        let mut raw = json!({
            "id": id,
            "state": "active",
            "product": product,
            "customer": customer,
            "coupon_code": request.coupon_code,
            "created_at": Utc::now().to_rfc3339(),
        });
        if let Some(next_billing_at) = request.next_billing_at {
            raw["next_assessment_at"] = json!(next_billing_at.to_rfc3339());
            raw["current_period_ends_at"] = json!(next_billing_at.to_rfc3339());
        }
        if let Some(expires_at) = request.expires_at {
            raw["expires_at"] = json!(expires_at.to_rfc3339());
        }

        let snapshot = SubscriptionSnapshot::new(raw);
        state
            .subscriptions
            .insert(SubscriptionId::new(id), snapshot.clone());
        Ok(snapshot)
    }

    async fn update_subscription(
        &self,
        subscription_id: SubscriptionId,
        product_handle: &str,
        next_billing_at: Option<DateTime<Utc>>,
    ) -> Result<SubscriptionSnapshot, BillingError> {
        self.enter(
            "update_subscription",
            vec![subscription_id.to_string(), product_handle.to_string()],
        )?;
        let product = {
            let state = self.inner.lock().unwrap();
            product_json(product_handle, state.products.get(product_handle))
        };
        self.update(subscription_id, |s| {
            s.set("product", product);
            if let Some(at) = next_billing_at {
                s.set("next_assessment_at", json!(at.to_rfc3339()));
            }
        })
    }

    async fn subscriptions_by_customer(
        &self,
        customer_id: CustomerId,
    ) -> Result<Option<Vec<SubscriptionSnapshot>>, BillingError> {
        self.enter("subscriptions_by_customer", vec![customer_id.to_string()])?;
        let state = self.inner.lock().unwrap();
        if !state.customers.values().any(|c| c.id == customer_id) {
            return Ok(None);
        }
        let mut subscriptions: Vec<_> = state
            .subscriptions
            .values()
            .filter(|s| s.customer_id() == Some(customer_id))
            .cloned()
            .collect();
        subscriptions.sort_by_key(|s| s.id());
        Ok(Some(subscriptions))
    }

    async fn list_subscriptions(
        &self,
        page: Page,
    ) -> Result<Vec<SubscriptionSnapshot>, BillingError> {
        self.enter("list_subscriptions", vec![page.page.to_string()])?;
        let state = self.inner.lock().unwrap();
        let mut all: Vec<_> = state.subscriptions.values().cloned().collect();
        all.sort_by_key(|s| s.id());
        let per_page = page.per_page.max(1) as usize;
        let skip = (page.page.max(1) as usize - 1) * per_page;
        Ok(all.into_iter().skip(skip).take(per_page).collect())
    }

    async fn get_subscription(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<Option<SubscriptionSnapshot>, BillingError> {
        self.enter("get_subscription", vec![subscription_id.to_string()])?;
        Ok(self.subscription(subscription_id))
    }

    async fn hold(
        &self,
        subscription_id: SubscriptionId,
        automatically_resume_at: NaiveDate,
    ) -> Result<(), BillingError> {
        self.enter(
            "hold",
            vec![subscription_id.to_string(), automatically_resume_at.to_string()],
        )?;
        self.update(subscription_id, |s| {
            s.set("state", json!("on_hold"));
            s.set(
                "automatically_resume_at",
                json!(automatically_resume_at.format("%Y-%m-%d").to_string()),
            );
        })?;
        Ok(())
    }

    async fn resume(&self, subscription_id: SubscriptionId) -> Result<(), BillingError> {
        self.enter("resume", vec![subscription_id.to_string()])?;
        self.update(subscription_id, |s| s.set("state", json!("active")))?;
        Ok(())
    }

    async fn set_product(
        &self,
        subscription_id: SubscriptionId,
        product_handle: &str,
        delayed: bool,
    ) -> Result<SubscriptionSnapshot, BillingError> {
        self.enter(
            "set_product",
            vec![
                subscription_id.to_string(),
                product_handle.to_string(),
                delayed.to_string(),
            ],
        )?;
        let product = {
            let state = self.inner.lock().unwrap();
            state.products.get(product_handle).cloned()
        };
        self.update(subscription_id, |s| {
            if delayed {
                s.set("next_product_id", json!(product.as_ref().map(|p| p.id)));
                s.set("next_product_handle", json!(product_handle));
            } else {
                s.set("product", product_json(product_handle, product.as_ref()));
            }
        })
    }

    async fn cancel_delayed_product_change(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<(), BillingError> {
        self.enter("cancel_delayed_product_change", vec![subscription_id.to_string()])?;
        self.update(subscription_id, |s| {
            s.set("next_product_id", Value::Null);
            s.set("next_product_handle", Value::Null);
        })?;
        Ok(())
    }

    async fn add_coupon(
        &self,
        subscription_id: SubscriptionId,
        coupon_code: &str,
    ) -> Result<SubscriptionSnapshot, BillingError> {
        self.enter(
            "add_coupon",
            vec![subscription_id.to_string(), coupon_code.to_string()],
        )?;
        self.update(subscription_id, |s| s.set("coupon_code", json!(coupon_code)))
    }

    async fn remove_coupon(&self, subscription_id: SubscriptionId) -> Result<(), BillingError> {
        self.enter("remove_coupon", vec![subscription_id.to_string()])?;
        self.update(subscription_id, |s| s.set("coupon_code", Value::Null))?;
        Ok(())
    }

    async fn cancel_subscription(
        &self,
        subscription_id: SubscriptionId,
        mode: CancelMode,
    ) -> Result<(), BillingError> {
        self.enter(
            "cancel_subscription",
            vec![subscription_id.to_string(), format!("{:?}", mode)],
        )?;
        self.update(subscription_id, |s| match mode {
            CancelMode::Delayed => s.set("cancel_at_end_of_period", json!(true)),
            CancelMode::Immediate { message } => {
                s.set("state", json!("canceled"));
                s.set("cancellation_message", json!(message));
                s.set("canceled_at", json!(Utc::now().to_rfc3339()));
            }
        })?;
        Ok(())
    }

    async fn cancel_pending_cancellation(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<(), BillingError> {
        self.enter("cancel_pending_cancellation", vec![subscription_id.to_string()])?;
        self.update(subscription_id, |s| {
            s.set("cancel_at_end_of_period", json!(false))
        })?;
        Ok(())
    }

    async fn reactivate(
        &self,
        subscription_id: SubscriptionId,
        include_trial: bool,
    ) -> Result<SubscriptionSnapshot, BillingError> {
        self.enter(
            "reactivate",
            vec![subscription_id.to_string(), include_trial.to_string()],
        )?;
        self.update(subscription_id, |s| {
            let state = if include_trial { "trialing" } else { "active" };
            s.set("state", json!(state));
            s.set("canceled_at", Value::Null);
        })
    }

    async fn set_next_billing_at(
        &self,
        subscription_id: SubscriptionId,
        next_billing_at: DateTime<Utc>,
    ) -> Result<(), BillingError> {
        self.enter(
            "set_next_billing_at",
            vec![subscription_id.to_string(), next_billing_at.to_rfc3339()],
        )?;
        self.update(subscription_id, |s| {
            s.set("next_assessment_at", json!(next_billing_at.to_rfc3339()))
        })?;
        Ok(())
    }

    async fn set_expires_at(
        &self,
        subscription_id: SubscriptionId,
        expires_at: DateTime<Utc>,
    ) -> Result<(), BillingError> {
        self.enter(
            "set_expires_at",
            vec![subscription_id.to_string(), expires_at.to_rfc3339()],
        )?;
        self.update(subscription_id, |s| {
            s.set("expires_at", json!(expires_at.to_rfc3339()))
        })?;
        Ok(())
    }

    async fn unset_expires_at(&self, subscription_id: SubscriptionId) -> Result<(), BillingError> {
        self.enter("unset_expires_at", vec![subscription_id.to_string()])?;
        self.update(subscription_id, |s| s.set("expires_at", Value::Null))?;
        Ok(())
    }

    async fn set_payment_collection_method(
        &self,
        subscription_id: SubscriptionId,
        method: PaymentCollectionMethod,
    ) -> Result<(), BillingError> {
        self.enter(
            "set_payment_collection_method",
            vec![subscription_id.to_string(), method.as_str().to_string()],
        )?;
        self.update(subscription_id, |s| {
            s.set("payment_collection_method", json!(method.as_str()))
        })?;
        Ok(())
    }

    async fn retry_subscription(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<(), BillingError> {
        self.enter("retry_subscription", vec![subscription_id.to_string()])?;
        self.update(subscription_id, |s| s.set("state", json!("active")))?;
        Ok(())
    }

    async fn create_migration(
        &self,
        subscription_id: SubscriptionId,
        product_handle: &str,
    ) -> Result<(), BillingError> {
        self.enter(
            "create_migration",
            vec![subscription_id.to_string(), product_handle.to_string()],
        )?;
        let product = {
            let state = self.inner.lock().unwrap();
            product_json(product_handle, state.products.get(product_handle))
        };
        self.update(subscription_id, |s| s.set("product", product))?;
        Ok(())
    }

    async fn purge_subscription(
        &self,
        subscription_id: SubscriptionId,
        customer_id: CustomerId,
    ) -> Result<(), BillingError> {
        self.enter(
            "purge_subscription",
            vec![subscription_id.to_string(), customer_id.to_string()],
        )?;
        self.inner
            .lock()
            .unwrap()
            .subscriptions
            .remove(&subscription_id)
            .ok_or_else(|| BillingError::not_found("subscription"))?;
        Ok(())
    }

    async fn create_payment_profile(
        &self,
        customer_id: CustomerId,
        chargify_token: &str,
    ) -> Result<PaymentProfile, BillingError> {
        self.enter(
            "create_payment_profile",
            vec![customer_id.to_string(), chargify_token.to_string()],
        )?;
        let id = self.inner.lock().unwrap().allocate_id();
        let mut extra = Map::new();
        extra.insert("customer_id".into(), json!(customer_id));
        Ok(PaymentProfile { id, extra })
    }

    async fn change_default_payment_profile(
        &self,
        subscription_id: SubscriptionId,
        payment_profile_id: i64,
    ) -> Result<(), BillingError> {
        self.enter(
            "change_default_payment_profile",
            vec![subscription_id.to_string(), payment_profile_id.to_string()],
        )?;
        self.update(subscription_id, |_| {})?;
        Ok(())
    }

    async fn delete_payment_profile(
        &self,
        subscription_id: SubscriptionId,
        payment_profile_id: i64,
    ) -> Result<(), BillingError> {
        self.enter(
            "delete_payment_profile",
            vec![subscription_id.to_string(), payment_profile_id.to_string()],
        )?;
        self.update(subscription_id, |s| {
            s.set("credit_card", Value::Null);
            s.set("paypal_account", Value::Null);
        })?;
        Ok(())
    }

    async fn get_product_by_handle(&self, handle: &str) -> Result<Option<Product>, BillingError> {
        self.enter("get_product_by_handle", vec![handle.to_string()])?;
        Ok(self.inner.lock().unwrap().products.get(handle).cloned())
    }

    async fn get_product_by_id(&self, product_id: i64) -> Result<Option<Product>, BillingError> {
        self.enter("get_product_by_id", vec![product_id.to_string()])?;
        Ok(self
            .inner
            .lock()
            .unwrap()
            .products
            .values()
            .find(|p| p.id == product_id)
            .cloned())
    }

    async fn product_families(&self) -> Result<Vec<Value>, BillingError> {
        self.enter("product_families", Vec::new())?;
        Ok(self
            .inner
            .lock()
            .unwrap()
            .families
            .iter()
            .map(|(family, _)| family.clone())
            .collect())
    }

    async fn family_products(&self, product_family_id: i64) -> Result<Vec<Value>, BillingError> {
        self.enter("family_products", vec![product_family_id.to_string()])?;
        Ok(self
            .inner
            .lock()
            .unwrap()
            .families
            .iter()
            .find(|(family, _)| family.get("id").and_then(Value::as_i64) == Some(product_family_id))
            .map(|(_, products)| products.clone())
            .unwrap_or_default())
    }

    async fn get_coupon(&self, code: &str) -> Result<Option<Value>, BillingError> {
        self.enter("get_coupon", vec![code.to_string()])?;
        Ok(self.inner.lock().unwrap().coupons.get(code).cloned())
    }

    async fn list_invoices(&self, page: Page) -> Result<Vec<Value>, BillingError> {
        self.enter("list_invoices", vec![page.page.to_string()])?;
        Ok(Vec::new())
    }

    async fn register_payment(
        &self,
        invoice_uid: &str,
        amount_in_cents: i64,
        memo: &str,
    ) -> Result<(), BillingError> {
        self.enter(
            "register_payment",
            vec![
                invoice_uid.to_string(),
                amount_in_cents.to_string(),
                memo.to_string(),
            ],
        )
    }

    async fn subscription_statements(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<Vec<Value>, BillingError> {
        self.enter("subscription_statements", vec![subscription_id.to_string()])?;
        Ok(Vec::new())
    }

    async fn get_statement(&self, statement_id: i64) -> Result<Value, BillingError> {
        self.enter("get_statement", vec![statement_id.to_string()])?;
        Err(BillingError::not_found("statement"))
    }

    async fn subscription_transactions(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<Vec<Value>, BillingError> {
        self.enter("subscription_transactions", vec![subscription_id.to_string()])?;
        Ok(Vec::new())
    }

    async fn get_transaction(&self, transaction_id: i64) -> Result<Value, BillingError> {
        self.enter("get_transaction", vec![transaction_id.to_string()])?;
        Err(BillingError::not_found("transaction"))
    }

    async fn create_metadata(
        &self,
        resource: MetadataResource,
        resource_id: i64,
        metadata: Vec<Metadata>,
    ) -> Result<(), BillingError> {
        self.enter(
            "create_metadata",
            vec![resource.as_path().to_string(), resource_id.to_string()],
        )?;
        if resource == MetadataResource::Subscriptions {
            self.inner
                .lock()
                .unwrap()
                .metadata
                .entry(SubscriptionId::new(resource_id))
                .or_default()
                .extend(metadata);
        }
        Ok(())
    }

    async fn subscription_metadata(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<Vec<Metadata>, BillingError> {
        self.enter("subscription_metadata", vec![subscription_id.to_string()])?;
        Ok(self
            .inner
            .lock()
            .unwrap()
            .metadata
            .get(&subscription_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_api_call(&self, call_id: &str) -> Result<Value, BillingError> {
        self.enter("get_api_call", vec![call_id.to_string()])?;
        self.inner
            .lock()
            .unwrap()
            .api_calls
            .get(call_id)
            .cloned()
            .ok_or_else(|| BillingError::provider(404, format!("get_api_call failed: {}", call_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::BillingErrorCode;

    fn attributes(reference: &str) -> CustomerAttributes {
        CustomerAttributes {
            reference: Some(reference.to_string()),
            first_name: "Jane".into(),
            last_name: "Doe".into(),
            email: "jane@example.com".into(),
            organization: None,
        }
    }

    #[tokio::test]
    async fn created_customer_can_be_looked_up() {
        let mock = MockBillingProvider::new();
        let created = mock.create_customer(&attributes("42")).await.unwrap();

        let found = mock.lookup_customer_by_reference("42").await.unwrap().unwrap();
        assert_eq!(found.id, created.id);
        assert!(mock.was_called("create_customer"));
    }

    #[tokio::test]
    async fn created_subscription_links_customer() {
        let mock = MockBillingProvider::new();
        let customer = mock.create_customer(&attributes("42")).await.unwrap();
        let snapshot = mock
            .create_subscription(CreateSubscriptionRequest {
                customer_reference: "42".into(),
                product_handle: "monthly".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(snapshot.customer_id(), Some(customer.id));
        let by_customer = mock
            .subscriptions_by_customer(customer.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_customer.len(), 1);
    }

    #[tokio::test]
    async fn method_error_is_returned_until_cleared() {
        let mock = MockBillingProvider::new();
        mock.set_method_error("get_coupon", BillingError::network("down"));

        let err = mock.get_coupon("X").await.unwrap_err();
        assert_eq!(err.code, BillingErrorCode::NetworkError);
        assert!(mock.get_coupon("X").await.is_err());

        mock.clear_errors();
        assert!(mock.get_coupon("X").await.unwrap().is_none());
        assert_eq!(mock.call_count("get_coupon"), 3);
    }

    #[tokio::test]
    async fn next_error_is_consumed_once() {
        let mock = MockBillingProvider::new();
        mock.set_error(BillingError::network("blip"));

        assert!(mock.product_families().await.is_err());
        assert!(mock.product_families().await.is_ok());
    }

    #[tokio::test]
    async fn immediate_cancel_updates_state() {
        let mock = MockBillingProvider::new();
        mock.add_subscription(SubscriptionSnapshot::new(json!({ "id": 5, "state": "active" })));

        mock.cancel_subscription(
            SubscriptionId::new(5),
            CancelMode::Immediate {
                message: "bye".into(),
            },
        )
        .await
        .unwrap();

        let snapshot = mock.subscription(SubscriptionId::new(5)).unwrap();
        assert_eq!(snapshot.state().map(|s| s.as_str()), Some("canceled"));
    }

    #[tokio::test]
    async fn operations_on_unknown_subscription_are_not_found() {
        let mock = MockBillingProvider::new();
        let err = mock.resume(SubscriptionId::new(404)).await.unwrap_err();
        assert_eq!(err.code, BillingErrorCode::NotFound);
    }
}
