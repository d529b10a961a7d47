//! UpdatePaymentMethodHandler - Attaches a tokenized card or PayPal account
//! to a subscription.
//!
//! A subscription whose trial ended or which was canceled is reactivated
//! once the new payment profile is in place. When Chargify rejects the
//! payment (422) the failure is tracked and reported to the caller instead
//! of being raised.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Map, Value};

use super::SubscriptionService;
use crate::domain::customer::PaymentMethod;
use crate::domain::foundation::{DomainError, ErrorCode, SubscriptionId, UserId};
use crate::domain::subscription::SubscriptionRecord;
use crate::ports::{EventTracker, PaymentCollectionMethod};

pub const PAYPAL_FAILED_EVENT: &str = "Paypal payment failed";
pub const CREDIT_CARD_FAILED_EVENT: &str = "Credit card payment failed";

/// Command carrying a Chargify.js token for a subscription.
#[derive(Debug, Clone)]
pub struct UpdatePaymentMethodCommand {
    pub subscription_id: SubscriptionId,
    pub user_id: UserId,
    pub payment_method: PaymentMethod,
    pub chargify_token: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpdatePaymentMethodResult {
    /// The profile is now the subscription default.
    Updated,
    /// The profile was attached and the subscription reactivated.
    Reactivated,
    /// Chargify refused the payment.
    Rejected { message: String },
}

pub struct UpdatePaymentMethodHandler {
    subscriptions: Arc<SubscriptionService>,
    tracker: Arc<dyn EventTracker>,
}

impl UpdatePaymentMethodHandler {
    pub fn new(subscriptions: Arc<SubscriptionService>, tracker: Arc<dyn EventTracker>) -> Self {
        Self {
            subscriptions,
            tracker,
        }
    }

    pub async fn handle(
        &self,
        cmd: UpdatePaymentMethodCommand,
    ) -> Result<UpdatePaymentMethodResult, DomainError> {
        if cmd.chargify_token.trim().is_empty() {
            return Err(DomainError::validation(
                "chargify_token",
                "Payment token is required",
            ));
        }

        // 1. Load the subscription and check ownership
        let mut record = self
            .subscriptions
            .load_owned(cmd.subscription_id, &cmd.user_id)
            .await?
            .ok_or_else(|| {
                DomainError::new(ErrorCode::Forbidden, "Subscription belongs to another user")
            })?;
        let customer_id = record.snapshot.customer_id().ok_or_else(|| {
            DomainError::new(
                ErrorCode::CustomerNotFound,
                format!("Subscription {} has no customer", record.id),
            )
        })?;

        // 2. Attach the new payment profile
        let attached = self
            .subscriptions
            .provider()
            .create_default_payment_profile(record.id, customer_id, &cmd.chargify_token)
            .await
            .map_err(DomainError::from);
        if let Err(e) = attached {
            return self.reject(&mut record, cmd.payment_method, e).await;
        }

        let mut snapshot = record.snapshot.clone();
        snapshot.set(
            "payment_collection_method",
            json!(PaymentCollectionMethod::Automatic.as_str()),
        );
        self.subscriptions
            .refresh_cache(&mut record, Some(snapshot))
            .await?;

        // 3. Reactivate if needed
        let needs_reactivation = record
            .state()
            .map(|s| s.needs_reactivation())
            .unwrap_or(false);
        if !needs_reactivation {
            return Ok(UpdatePaymentMethodResult::Updated);
        }

        match self.subscriptions.reactivate(&mut record, false, true).await {
            Ok(()) => Ok(UpdatePaymentMethodResult::Reactivated),
            Err(e) => self.reject(&mut record, cmd.payment_method, e).await,
        }
    }

    async fn reject(
        &self,
        record: &mut SubscriptionRecord,
        payment_method: PaymentMethod,
        error: DomainError,
    ) -> Result<UpdatePaymentMethodResult, DomainError> {
        if error.code != ErrorCode::PaymentRejected {
            return Err(error);
        }

        self.subscriptions.refresh_cache(record, None).await?;

        let (label, properties) = failure_event(record, payment_method);
        self.tracker.track(&record.user_id, label, properties).await;

        tracing::warn!(
            subscription_id = %record.id,
            payment_method = %payment_method,
            error = %error.message,
            "Payment rejected by Chargify"
        );
        Ok(UpdatePaymentMethodResult::Rejected {
            message: error.message,
        })
    }
}

fn failure_event(
    record: &SubscriptionRecord,
    payment_method: PaymentMethod,
) -> (&'static str, Map<String, Value>) {
    let snapshot = &record.snapshot;
    let mut properties = Map::new();
    properties.insert(
        "date".into(),
        json!(Utc::now().format("%d/%m/%Y").to_string()),
    );

    let label = match payment_method {
        PaymentMethod::Paypal => {
            properties.insert("paypal_account_email".into(), json!(snapshot.paypal_email()));
            PAYPAL_FAILED_EVENT
        }
        PaymentMethod::CreditCard => {
            let card = snapshot.credit_card();
            let field = |name: &str| card.and_then(|c| c.get(name)).cloned().unwrap_or(Value::Null);
            let expiration = match (field("expiration_month"), field("expiration_year")) {
                (Value::Null, _) | (_, Value::Null) => Value::Null,
                (month, year) => json!(format!("{}/{}", plain(&month), plain(&year))),
            };
            properties.insert(
                "masked_card_number".into(),
                json!(snapshot.credit_card_masked_card_number()),
            );
            properties.insert("expiration_date".into(), expiration);
            CREDIT_CARD_FAILED_EVENT
        }
    };
    properties.insert("plan_label".into(), json!(snapshot.plan_name()));
    (label, properties)
}

fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::chargify::MockBillingProvider;
    use crate::adapters::memory::InMemorySubscriptionRepository;
    use crate::adapters::tracking::RecordingEventTracker;
    use crate::domain::subscription::SubscriptionSnapshot;
    use crate::ports::{BillingError, SubscriptionRepository};

    struct Fixture {
        mock: MockBillingProvider,
        tracker: RecordingEventTracker,
        handler: UpdatePaymentMethodHandler,
    }

    async fn fixture(state: &str) -> Fixture {
        let mock = MockBillingProvider::new();
        let repository = InMemorySubscriptionRepository::new();
        let tracker = RecordingEventTracker::new();

        mock.add_subscription(SubscriptionSnapshot::new(json!({
            "id": 1,
            "state": state,
            "payment_collection_method": "invoice",
            "product": { "handle": "monthly", "name": "Monthly" },
            "customer": { "id": 7, "reference": "42" },
            "credit_card": {
                "masked_card_number": "XXXX-XXXX-XXXX-1111",
                "expiration_month": 9,
                "expiration_year": 2027
            },
            "paypal_account": { "paypal_email": "jane@example.com" }
        })));
        repository
            .save(&SubscriptionRecord::new(
                SubscriptionId::new(1),
                UserId::new("42").unwrap(),
                SubscriptionSnapshot::empty(),
            ))
            .await
            .unwrap();

        let service = Arc::new(SubscriptionService::new(
            Arc::new(mock.clone()),
            Arc::new(repository),
            Arc::new(tracker.clone()),
        ));
        let handler = UpdatePaymentMethodHandler::new(service, Arc::new(tracker.clone()));
        Fixture {
            mock,
            tracker,
            handler,
        }
    }

    fn command(payment_method: PaymentMethod) -> UpdatePaymentMethodCommand {
        UpdatePaymentMethodCommand {
            subscription_id: SubscriptionId::new(1),
            user_id: UserId::new("42").unwrap(),
            payment_method,
            chargify_token: "tok_123".into(),
        }
    }

    // ══════════════════════════════════════════════════════════════
    // Success
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn active_subscription_is_only_updated() {
        let fx = fixture("active").await;

        let result = fx.handler.handle(command(PaymentMethod::CreditCard)).await.unwrap();

        assert_eq!(result, UpdatePaymentMethodResult::Updated);
        assert!(fx.mock.was_called("change_default_payment_profile"));
        assert!(!fx.mock.was_called("reactivate"));
    }

    #[tokio::test]
    async fn canceled_subscription_is_reactivated_without_trial() {
        let fx = fixture("canceled").await;

        let result = fx.handler.handle(command(PaymentMethod::CreditCard)).await.unwrap();

        assert_eq!(result, UpdatePaymentMethodResult::Reactivated);
        assert_eq!(fx.mock.last_args("reactivate").unwrap()[1], "false");
    }

    #[tokio::test]
    async fn trial_ended_subscription_is_reactivated() {
        let fx = fixture("trial_ended").await;

        let result = fx.handler.handle(command(PaymentMethod::Paypal)).await.unwrap();

        assert_eq!(result, UpdatePaymentMethodResult::Reactivated);
        assert!(fx.tracker.events().await.is_empty());
    }

    // ══════════════════════════════════════════════════════════════
    // Failures
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn blank_token_is_rejected_before_any_call() {
        let fx = fixture("active").await;
        let mut cmd = command(PaymentMethod::CreditCard);
        cmd.chargify_token = "  ".into();

        let err = fx.handler.handle(cmd).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationFailed);
        assert!(fx.mock.calls().is_empty());
    }

    #[tokio::test]
    async fn other_users_subscription_is_forbidden() {
        let fx = fixture("active").await;
        let mut cmd = command(PaymentMethod::CreditCard);
        cmd.user_id = UserId::new("99").unwrap();

        let err = fx.handler.handle(cmd).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::Forbidden);
        assert!(fx.mock.calls().is_empty());
    }

    #[tokio::test]
    async fn rejected_card_is_tracked_with_card_details() {
        let fx = fixture("active").await;
        fx.mock.set_method_error(
            "create_payment_profile",
            BillingError::unprocessable(vec!["Card declined".into()]),
        );

        let result = fx.handler.handle(command(PaymentMethod::CreditCard)).await.unwrap();

        assert!(matches!(result, UpdatePaymentMethodResult::Rejected { .. }));
        let events = fx.tracker.events().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].label, CREDIT_CARD_FAILED_EVENT);
        assert_eq!(
            events[0].properties.get("masked_card_number"),
            Some(&json!("XXXX-XXXX-XXXX-1111"))
        );
        assert_eq!(
            events[0].properties.get("expiration_date"),
            Some(&json!("9/2027"))
        );
        assert_eq!(events[0].properties.get("plan_label"), Some(&json!("monthly")));
    }

    #[tokio::test]
    async fn rejected_reactivation_is_tracked_with_paypal_email() {
        let fx = fixture("canceled").await;
        fx.mock.set_method_error(
            "reactivate",
            BillingError::unprocessable(vec!["PayPal refused".into()]),
        );

        let result = fx.handler.handle(command(PaymentMethod::Paypal)).await.unwrap();

        assert!(matches!(result, UpdatePaymentMethodResult::Rejected { .. }));
        let events = fx.tracker.events().await;
        assert_eq!(events[0].label, PAYPAL_FAILED_EVENT);
        assert_eq!(
            events[0].properties.get("paypal_account_email"),
            Some(&json!("jane@example.com"))
        );
    }

    #[tokio::test]
    async fn network_errors_are_raised() {
        let fx = fixture("active").await;
        fx.mock
            .set_method_error("create_payment_profile", BillingError::network("reset"));

        let err = fx
            .handler
            .handle(command(PaymentMethod::CreditCard))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::BillingProviderError);
        assert!(fx.tracker.events().await.is_empty());
    }
}
