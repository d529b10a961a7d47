//! Parsed Chargify webhook.

use serde_json::{Map, Value};
use std::fmt;

use super::form_params::parse_webhook_body;
use super::WebhookError;
use crate::domain::foundation::SubscriptionId;
use crate::domain::subscription::as_integer;

/// Chargify webhook event names this application distinguishes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WebhookEventKind {
    SignupSuccess,
    SignupFailure,
    RenewalSuccess,
    RenewalFailure,
    PaymentSuccess,
    PaymentFailure,
    BillingDateChange,
    SubscriptionStateChange,
    SubscriptionProductChange,
    SubscriptionCardUpdate,
    ExpiringCard,
    ExpirationDateChange,
    CustomerUpdate,
    UpcomingRenewalNotice,
    EndOfTrialNotice,
    DelayedSubscriptionCreationSuccess,
    DunningStepReached,
    PendingCancellationChange,
    /// Sent by the "Send test webhook" button.
    Test,
    Other(String),
}

impl WebhookEventKind {
    pub fn parse(name: &str) -> Self {
        match name {
            "signup_success" => Self::SignupSuccess,
            "signup_failure" => Self::SignupFailure,
            "renewal_success" => Self::RenewalSuccess,
            "renewal_failure" => Self::RenewalFailure,
            "payment_success" => Self::PaymentSuccess,
            "payment_failure" => Self::PaymentFailure,
            "billing_date_change" => Self::BillingDateChange,
            "subscription_state_change" => Self::SubscriptionStateChange,
            "subscription_product_change" => Self::SubscriptionProductChange,
            "subscription_card_update" => Self::SubscriptionCardUpdate,
            "expiring_card" => Self::ExpiringCard,
            "expiration_date_change" => Self::ExpirationDateChange,
            "customer_update" => Self::CustomerUpdate,
            "upcoming_renewal_notice" => Self::UpcomingRenewalNotice,
            "end_of_trial_notice" => Self::EndOfTrialNotice,
            "delayed_subscription_creation_success" => Self::DelayedSubscriptionCreationSuccess,
            "dunning_step_reached" => Self::DunningStepReached,
            "pending_cancellation_change" => Self::PendingCancellationChange,
            "test" => Self::Test,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::SignupSuccess => "signup_success",
            Self::SignupFailure => "signup_failure",
            Self::RenewalSuccess => "renewal_success",
            Self::RenewalFailure => "renewal_failure",
            Self::PaymentSuccess => "payment_success",
            Self::PaymentFailure => "payment_failure",
            Self::BillingDateChange => "billing_date_change",
            Self::SubscriptionStateChange => "subscription_state_change",
            Self::SubscriptionProductChange => "subscription_product_change",
            Self::SubscriptionCardUpdate => "subscription_card_update",
            Self::ExpiringCard => "expiring_card",
            Self::ExpirationDateChange => "expiration_date_change",
            Self::CustomerUpdate => "customer_update",
            Self::UpcomingRenewalNotice => "upcoming_renewal_notice",
            Self::EndOfTrialNotice => "end_of_trial_notice",
            Self::DelayedSubscriptionCreationSuccess => "delayed_subscription_creation_success",
            Self::DunningStepReached => "dunning_step_reached",
            Self::PendingCancellationChange => "pending_cancellation_change",
            Self::Test => "test",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for WebhookEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded webhook delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct ChargifyWebhook {
    /// Chargify webhook id (`id` field, also sent as `X-Chargify-Webhook-Id`).
    pub id: String,
    pub event: WebhookEventKind,
    pub payload: Map<String, Value>,
}

impl ChargifyWebhook {
    /// Decodes a form body. `fallback_id` is used when the body has no `id`.
    pub fn from_form_body(body: &[u8], fallback_id: Option<&str>) -> Result<Self, WebhookError> {
        let mut params = parse_webhook_body(body);

        let event = match params.remove("event") {
            Some(Value::String(name)) if !name.is_empty() => WebhookEventKind::parse(&name),
            _ => return Err(WebhookError::MissingField("event")),
        };

        let id = match params.remove("id") {
            Some(Value::String(id)) if !id.is_empty() => id,
            _ => fallback_id
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .ok_or(WebhookError::MissingField("id"))?,
        };

        let payload = match params.remove("payload") {
            Some(Value::Object(map)) => map,
            Some(_) => return Err(WebhookError::ParseError("payload is not an object".into())),
            None => Map::new(),
        };

        Ok(Self { id, event, payload })
    }

    /// The `payload[subscription]` object, if any.
    pub fn subscription(&self) -> Option<&Map<String, Value>> {
        self.payload.get("subscription")?.as_object()
    }

    pub fn subscription_id(&self) -> Option<SubscriptionId> {
        self.subscription()?
            .get("id")
            .and_then(as_integer)
            .map(SubscriptionId::new)
    }

    /// Payload as JSON, for the processed-event ledger.
    pub fn payload_json(&self) -> Value {
        Value::Object(self.payload.clone())
    }
}
