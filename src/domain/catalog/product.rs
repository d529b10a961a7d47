//! Chargify product as listed in the catalog.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::foundation::ValidationError;
use crate::domain::subscription::as_integer;

/// A Chargify product with the interval helper flags the catalog adds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub handle: String,
    pub name: String,
    pub price_in_cents: Option<i64>,
    pub interval: Option<i64>,
    pub interval_unit: Option<String>,

    /// Billed every 12 months.
    pub interval_yearly: bool,

    /// Billed every month.
    pub interval_monthly: bool,

    /// Remaining provider fields, kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Product {
    /// Builds a product from the provider's `product` object.
    pub fn from_provider(value: Value) -> Result<Self, ValidationError> {
        let Value::Object(mut map) = value else {
            return Err(ValidationError::invalid_format("product", "expected an object"));
        };

        let id = map
            .remove("id")
            .as_ref()
            .and_then(as_integer)
            .ok_or_else(|| ValidationError::empty_field("product.id"))?;
        let handle = match map.remove("handle") {
            Some(Value::String(h)) if !h.is_empty() => h,
            _ => return Err(ValidationError::empty_field("product.handle")),
        };
        let name = match map.remove("name") {
            Some(Value::String(n)) => n,
            _ => String::new(),
        };
        let price_in_cents = map.remove("price_in_cents").as_ref().and_then(as_integer);
        let interval = map.remove("interval").as_ref().and_then(as_integer);
        let interval_unit = match map.remove("interval_unit") {
            Some(Value::String(u)) => Some(u),
            _ => None,
        };
        map.remove("interval_yearly");
        map.remove("interval_monthly");

        let monthly_unit = interval_unit.as_deref() == Some("month");
        Ok(Self {
            id,
            handle,
            name,
            price_in_cents,
            interval,
            interval_yearly: monthly_unit && interval == Some(12),
            interval_monthly: monthly_unit && interval == Some(1),
            interval_unit,
            extra: map,
        })
    }
}
