//! HTTP DTOs for billing endpoints.

use std::collections::BTreeMap;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::application::{DirectOutcome, UpdatePaymentMethodResult};
use crate::domain::catalog::Product;
use crate::domain::subscription::{FieldValue, SubscriptionRecord};

// ════════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Request for Chargify Direct signup form parameters.
///
/// The signed form data is derived from the caller, so no other fields are
/// accepted.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SecureParamsRequest {
    /// Catalog handle of the product to sign up for.
    #[serde(default)]
    pub product_handle: Option<String>,
    /// Must equal the configured callback URL when given.
    #[serde(default)]
    pub redirect_uri: Option<String>,
}

/// Request to start a trial, optionally with a trial coupon.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StartTrialRequest {
    #[serde(default)]
    pub coupon_token: Option<String>,
}

/// Request to attach a Chargify.js token to a subscription.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdatePaymentMethodRequest {
    pub payment_method: String,
    pub chargify_token: String,
}

// ════════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Subscription with every proxied attribute.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionResponse {
    pub id: i64,
    pub user_id: String,
    pub state: Option<String>,
    pub plan_type: &'static str,
    pub remaining_days: i64,
    pub hold_start_date: Option<NaiveDate>,
    pub hold_end_date: Option<NaiveDate>,
    pub trial_coupon: Option<String>,
    pub attributes: BTreeMap<&'static str, FieldValue>,
}

impl From<&SubscriptionRecord> for SubscriptionResponse {
    fn from(record: &SubscriptionRecord) -> Self {
        Self {
            id: record.id.as_i64(),
            user_id: record.user_id.to_string(),
            state: record.state().map(|s| s.as_str().to_string()),
            plan_type: record.plan_type_name(),
            remaining_days: record.remaining_days(Utc::now().naive_utc()),
            hold_start_date: record.hold_start_date,
            hold_end_date: record.hold_end_date,
            trial_coupon: record.trial_coupon.as_ref().map(|c| c.codename.clone()),
            attributes: record.snapshot.attributes().into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdatePaymentMethodResponse {
    pub result: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<UpdatePaymentMethodResult> for UpdatePaymentMethodResponse {
    fn from(result: UpdatePaymentMethodResult) -> Self {
        match result {
            UpdatePaymentMethodResult::Updated => Self {
                result: "updated",
                message: None,
            },
            UpdatePaymentMethodResult::Reactivated => Self {
                result: "reactivated",
                message: None,
            },
            UpdatePaymentMethodResult::Rejected { message } => Self {
                result: "rejected",
                message: Some(message),
            },
        }
    }
}

/// Outcome of a Chargify Direct redirect.
#[derive(Debug, Clone, Serialize)]
pub struct DirectCallbackResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_profile: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<DirectOutcome> for DirectCallbackResponse {
    fn from(outcome: DirectOutcome) -> Self {
        match outcome {
            DirectOutcome::Completed {
                payment_profile, ..
            } => Self {
                status: "completed",
                payment_profile,
                error: None,
            },
            DirectOutcome::Rejected { error, .. } => Self {
                status: "rejected",
                payment_profile: None,
                error,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductsResponse {
    pub paying: Vec<Product>,
    pub trial: Product,
}

/// Error body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error_code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<BTreeMap<String, String>>,
}

impl ErrorResponse {
    pub fn new(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: BTreeMap<String, String>) -> Self {
        if !details.is_empty() {
            self.details = Some(details);
        }
        self
    }
}
