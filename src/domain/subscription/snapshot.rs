//! Cached Chargify subscription snapshot and its attribute proxy.
//!
//! The local record keeps the last JSON object Chargify returned for a
//! subscription. Read-only provider fields are exposed through a fixed table
//! mapping a local attribute name to a path inside that object plus an
//! optional converter. Missing data never errors: it reads as empty.

use std::collections::HashMap;

use chrono::{DateTime, FixedOffset, NaiveDate};
use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::fields::{as_integer, convert_price, expiration_last_day, lower, parse_datetime};
use super::SubscriptionState;
use crate::domain::foundation::{CustomerId, SubscriptionId};

/// Post-processing applied to a proxied value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Converter {
    Raw,
    Price,
    Date,
    ExpirationLastDay,
    Lowercase,
}

/// One row of the proxy table.
#[derive(Debug, Clone, Copy)]
pub struct ProxiedAttribute {
    pub name: &'static str,
    pub path: &'static [&'static str],
    pub converter: Converter,
}

const fn attr(
    name: &'static str,
    path: &'static [&'static str],
    converter: Converter,
) -> ProxiedAttribute {
    ProxiedAttribute {
        name,
        path,
        converter,
    }
}

/// Local attribute name → snapshot path and converter.
pub const PROXIED_ATTRIBUTES: &[ProxiedAttribute] = &[
    attr("balance", &["balance_in_cents"], Converter::Price),
    attr("canceled_at", &["canceled_at"], Converter::Date),
    attr("coupon_code", &["coupon_code"], Converter::Raw),
    attr("credit_card", &["credit_card"], Converter::Raw),
    attr("credit_card_expiration_date", &["credit_card"], Converter::ExpirationLastDay),
    attr("credit_card_masked_card_number", &["credit_card", "masked_card_number"], Converter::Raw),
    attr("current_billing_amount", &["current_billing_amount_in_cents"], Converter::Price),
    attr("current_billing_amount_in_cents", &["current_billing_amount_in_cents"], Converter::Raw),
    attr("current_period_ends_at", &["current_period_ends_at"], Converter::Date),
    attr("customer", &["customer"], Converter::Raw),
    attr("next_assessment_at", &["next_assessment_at"], Converter::Date),
    attr("next_product_id", &["next_product_id"], Converter::Raw),
    attr("next_product_handle", &["next_product_handle"], Converter::Raw),
    attr("payment_collection_method", &["payment_collection_method"], Converter::Raw),
    attr("payment_type", &["payment_type"], Converter::Raw),
    attr("paypal_account", &["paypal_account"], Converter::Raw),
    attr("paypal_email", &["paypal_account", "paypal_email"], Converter::Raw),
    attr("pending_cancellation", &["cancel_at_end_of_period"], Converter::Raw),
    attr("product", &["product"], Converter::Raw),
    attr("product_handle", &["product", "handle"], Converter::Raw),
    attr("product_price", &["product", "price_in_cents"], Converter::Price),
    attr("state", &["state"], Converter::Raw),
    attr("trial_ended_at", &["trial_ended_at"], Converter::Date),
    attr("plan_interval_unit", &["product", "interval_unit"], Converter::Raw),
    attr("plan_interval_length", &["product", "interval"], Converter::Raw),
    attr("plan_name", &["product", "name"], Converter::Lowercase),
    attr("plan_handle", &["product", "handle"], Converter::Lowercase),
    attr("total_revenue", &["total_revenue_in_cents"], Converter::Price),
];

static ATTRIBUTE_INDEX: Lazy<HashMap<&'static str, &'static ProxiedAttribute>> =
    Lazy::new(|| PROXIED_ATTRIBUTES.iter().map(|a| (a.name, a)).collect());

/// Value produced by a dynamic attribute lookup.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Path missing, null, or the converter could not use the value.
    Empty,
    Json(Value),
    Text(String),
    Amount(Decimal),
    DateTime(DateTime<FixedOffset>),
    Date(NaiveDate),
}

impl FieldValue {
    pub fn is_empty(&self) -> bool {
        matches!(self, FieldValue::Empty)
    }
}

/// Provider-side subscription object as last fetched from Chargify.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionSnapshot(Map<String, Value>);

impl SubscriptionSnapshot {
    /// Wraps a subscription object. Anything other than an object is empty.
    pub fn new(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self::default(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    /// Overwrites a top-level key, used when a local write has not been
    /// reflected by a refresh yet.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    /// Walks `path` through nested objects. Missing keys, non-object
    /// intermediates and nulls all yield `None`.
    pub fn value_at(&self, path: &[&str]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        let mut current = self.0.get(*first)?;
        for key in rest {
            current = current.as_object()?.get(*key)?;
        }
        if current.is_null() {
            None
        } else {
            Some(current)
        }
    }

    fn text_at(&self, path: &[&str]) -> Option<&str> {
        self.value_at(path)?.as_str().filter(|s| !s.is_empty())
    }

    fn object_at(&self, path: &[&str]) -> Option<&Map<String, Value>> {
        self.value_at(path)?.as_object()
    }

    /// Dynamic proxy lookup. `None` means the attribute is not proxied;
    /// `Some(FieldValue::Empty)` means it is proxied but has no value.
    pub fn attribute(&self, name: &str) -> Option<FieldValue> {
        let attribute = ATTRIBUTE_INDEX.get(name)?;
        let raw = self.value_at(attribute.path);

        let value = match attribute.converter {
            Converter::Raw => raw.cloned().map(FieldValue::Json),
            Converter::Price => Some(FieldValue::Amount(convert_price(raw))),
            Converter::Date => raw.and_then(parse_datetime).map(FieldValue::DateTime),
            Converter::ExpirationLastDay => raw.and_then(expiration_last_day).map(FieldValue::Date),
            Converter::Lowercase => raw.and_then(lower).map(FieldValue::Text),
        };

        Some(value.unwrap_or(FieldValue::Empty))
    }

    /// Every proxied attribute with its current value.
    pub fn attributes(&self) -> Vec<(&'static str, FieldValue)> {
        PROXIED_ATTRIBUTES
            .iter()
            .map(|a| (a.name, self.attribute(a.name).unwrap_or(FieldValue::Empty)))
            .collect()
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Typed accessors
    // ════════════════════════════════════════════════════════════════════════════

    pub fn id(&self) -> Option<SubscriptionId> {
        self.value_at(&["id"]).and_then(as_integer).map(SubscriptionId::new)
    }

    pub fn state(&self) -> Option<SubscriptionState> {
        self.text_at(&["state"])
            .and_then(|s| s.parse().ok())
    }

    pub fn balance(&self) -> Decimal {
        convert_price(self.value_at(&["balance_in_cents"]))
    }

    pub fn canceled_at(&self) -> Option<DateTime<FixedOffset>> {
        self.value_at(&["canceled_at"]).and_then(parse_datetime)
    }

    pub fn coupon_code(&self) -> Option<&str> {
        self.text_at(&["coupon_code"])
    }

    pub fn credit_card(&self) -> Option<&Map<String, Value>> {
        self.object_at(&["credit_card"])
    }

    pub fn credit_card_expiration_date(&self) -> Option<NaiveDate> {
        self.value_at(&["credit_card"]).and_then(expiration_last_day)
    }

    pub fn credit_card_masked_card_number(&self) -> Option<&str> {
        self.text_at(&["credit_card", "masked_card_number"])
    }

    pub fn current_billing_amount(&self) -> Decimal {
        convert_price(self.value_at(&["current_billing_amount_in_cents"]))
    }

    pub fn current_billing_amount_in_cents(&self) -> Option<i64> {
        self.value_at(&["current_billing_amount_in_cents"])
            .and_then(as_integer)
    }

    pub fn current_period_ends_at(&self) -> Option<DateTime<FixedOffset>> {
        self.value_at(&["current_period_ends_at"]).and_then(parse_datetime)
    }

    pub fn customer(&self) -> Option<&Map<String, Value>> {
        self.object_at(&["customer"])
    }

    pub fn customer_id(&self) -> Option<CustomerId> {
        self.value_at(&["customer", "id"])
            .and_then(as_integer)
            .map(CustomerId::new)
    }

    pub fn next_assessment_at(&self) -> Option<DateTime<FixedOffset>> {
        self.value_at(&["next_assessment_at"]).and_then(parse_datetime)
    }

    pub fn next_product_id(&self) -> Option<i64> {
        self.value_at(&["next_product_id"]).and_then(as_integer)
    }

    pub fn next_product_handle(&self) -> Option<&str> {
        self.text_at(&["next_product_handle"])
    }

    pub fn payment_collection_method(&self) -> Option<&str> {
        self.text_at(&["payment_collection_method"])
    }

    pub fn payment_type(&self) -> Option<&str> {
        self.text_at(&["payment_type"])
    }

    pub fn paypal_account(&self) -> Option<&Map<String, Value>> {
        self.object_at(&["paypal_account"])
    }

    pub fn paypal_email(&self) -> Option<&str> {
        self.text_at(&["paypal_account", "paypal_email"])
    }

    /// `cancel_at_end_of_period`; webhook payloads send it as a string.
    pub fn pending_cancellation(&self) -> bool {
        match self.value_at(&["cancel_at_end_of_period"]) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s == "true",
            _ => false,
        }
    }

    pub fn product(&self) -> Option<&Map<String, Value>> {
        self.object_at(&["product"])
    }

    pub fn product_handle(&self) -> Option<&str> {
        self.text_at(&["product", "handle"])
    }

    pub fn product_price(&self) -> Decimal {
        convert_price(self.value_at(&["product", "price_in_cents"]))
    }

    pub fn trial_ended_at(&self) -> Option<DateTime<FixedOffset>> {
        self.value_at(&["trial_ended_at"]).and_then(parse_datetime)
    }

    pub fn plan_interval_unit(&self) -> Option<&str> {
        self.text_at(&["product", "interval_unit"])
    }

    pub fn plan_interval_length(&self) -> Option<i64> {
        self.value_at(&["product", "interval"]).and_then(as_integer)
    }

    pub fn plan_name(&self) -> Option<String> {
        self.value_at(&["product", "name"]).and_then(lower)
    }

    pub fn plan_handle(&self) -> Option<String> {
        self.value_at(&["product", "handle"]).and_then(lower)
    }

    pub fn total_revenue(&self) -> Decimal {
        convert_price(self.value_at(&["total_revenue_in_cents"]))
    }
}

impl From<Value> for SubscriptionSnapshot {
    fn from(value: Value) -> Self {
        Self::new(value)
    }
}
