//! HandleChargifyWebhookHandler - Keeps cached snapshots in sync with
//! Chargify notifications.
//!
//! Every webhook that references a locally known subscription triggers a
//! refetch of that subscription; payload contents are never trusted as the
//! new snapshot. Deliveries are de-duplicated on the webhook id.

use std::sync::Arc;

use crate::domain::foundation::DomainError;
use crate::domain::webhook::{
    ChargifyWebhook, ChargifyWebhookVerifier, WebhookError, SIGNATURE_HEADER,
};
use crate::ports::{
    BillingProvider, SaveResult, SubscriptionRepository, WebhookEventRecord,
    WebhookEventRepository, WebhookResult,
};

/// Command to handle one webhook delivery.
#[derive(Debug, Clone)]
pub struct HandleChargifyWebhookCommand {
    /// Raw form-encoded body.
    pub body: Vec<u8>,
    /// Hex HMAC-SHA256 from the signature header.
    pub signature: Option<String>,
    /// Webhook id from the id header.
    pub webhook_id: Option<String>,
}

pub struct HandleChargifyWebhookHandler {
    verifier: Option<ChargifyWebhookVerifier>,
    webhook_events: Arc<dyn WebhookEventRepository>,
    subscriptions: Arc<dyn SubscriptionRepository>,
    provider: Arc<dyn BillingProvider>,
}

impl HandleChargifyWebhookHandler {
    /// Without a verifier, signatures are not checked.
    pub fn new(
        verifier: Option<ChargifyWebhookVerifier>,
        webhook_events: Arc<dyn WebhookEventRepository>,
        subscriptions: Arc<dyn SubscriptionRepository>,
        provider: Arc<dyn BillingProvider>,
    ) -> Self {
        Self {
            verifier,
            webhook_events,
            subscriptions,
            provider,
        }
    }

    pub async fn handle(
        &self,
        cmd: HandleChargifyWebhookCommand,
    ) -> Result<WebhookResult, WebhookError> {
        // 1. Verify signature
        if let Some(verifier) = &self.verifier {
            let signature = cmd
                .signature
                .as_deref()
                .ok_or(WebhookError::MissingHeader(SIGNATURE_HEADER))?;
            verifier.verify(&cmd.body, signature)?;
        }

        // 2. Decode
        let webhook = ChargifyWebhook::from_form_body(&cmd.body, cmd.webhook_id.as_deref())?;

        // 3. Idempotency check
        if self
            .webhook_events
            .find_by_event_id(&webhook.id)
            .await
            .map_err(database)?
            .is_some()
        {
            tracing::debug!(webhook_id = %webhook.id, "Duplicate webhook delivery");
            return Ok(WebhookResult::AlreadyProcessed);
        }

        // 4. Find the local subscription
        let Some(subscription_id) = webhook.subscription_id() else {
            return self.ignore(&webhook, "no subscription in payload").await;
        };
        let Some(mut record) = self
            .subscriptions
            .find_by_id(subscription_id)
            .await
            .map_err(database)?
        else {
            return self
                .ignore(&webhook, &format!("unknown subscription {}", subscription_id))
                .await;
        };

        // 5. Refresh the cached snapshot
        let snapshot = self
            .provider
            .get_subscription(subscription_id)
            .await
            .map_err(|e| {
                tracing::error!(%subscription_id, error = %e, "Failed to refetch subscription");
                WebhookError::Provider(e.to_string())
            })?
            .unwrap_or_default();
        record.replace_snapshot(snapshot);
        self.subscriptions.update(&record).await.map_err(database)?;

        // 6. Record processing
        let saved = self
            .webhook_events
            .save(WebhookEventRecord::success(
                &webhook.id,
                webhook.event.as_str(),
                webhook.payload_json(),
            ))
            .await
            .map_err(database)?;
        if saved == SaveResult::AlreadyExists {
            return Ok(WebhookResult::AlreadyProcessed);
        }

        tracing::info!(
            webhook_id = %webhook.id,
            event = %webhook.event,
            %subscription_id,
            "Subscription refreshed from webhook"
        );
        Ok(WebhookResult::Processed)
    }

    async fn ignore(
        &self,
        webhook: &ChargifyWebhook,
        reason: &str,
    ) -> Result<WebhookResult, WebhookError> {
        tracing::info!(webhook_id = %webhook.id, event = %webhook.event, reason, "Webhook ignored");
        let saved = self
            .webhook_events
            .save(WebhookEventRecord::ignored(
                &webhook.id,
                webhook.event.as_str(),
                reason,
                webhook.payload_json(),
            ))
            .await
            .map_err(database)?;
        Ok(match saved {
            SaveResult::Inserted => WebhookResult::Ignored,
            SaveResult::AlreadyExists => WebhookResult::AlreadyProcessed,
        })
    }
}

fn database(e: DomainError) -> WebhookError {
    WebhookError::Database(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::chargify::MockBillingProvider;
    use crate::adapters::memory::{InMemorySubscriptionRepository, InMemoryWebhookEventRepository};
    use crate::domain::foundation::{SubscriptionId, UserId};
    use crate::domain::subscription::{SubscriptionRecord, SubscriptionSnapshot};
    use crate::domain::webhook::compute_test_signature;
    use crate::ports::BillingError;
    use serde_json::json;

    const KEY: &str = "shared-key";
    const BODY: &[u8] =
        b"id=81&event=subscription_state_change&payload[subscription][id]=1&payload[subscription][state]=past_due";

    struct Fixture {
        mock: MockBillingProvider,
        events: InMemoryWebhookEventRepository,
        subscriptions: InMemorySubscriptionRepository,
        handler: HandleChargifyWebhookHandler,
    }

    async fn fixture(verifier: Option<ChargifyWebhookVerifier>) -> Fixture {
        let mock = MockBillingProvider::new();
        let events = InMemoryWebhookEventRepository::new();
        let subscriptions = InMemorySubscriptionRepository::new();

        mock.add_subscription(SubscriptionSnapshot::new(
            json!({ "id": 1, "state": "past_due" }),
        ));
        subscriptions
            .save(&SubscriptionRecord::new(
                SubscriptionId::new(1),
                UserId::new("42").unwrap(),
                SubscriptionSnapshot::new(json!({ "id": 1, "state": "active" })),
            ))
            .await
            .unwrap();

        let handler = HandleChargifyWebhookHandler::new(
            verifier,
            Arc::new(events.clone()),
            Arc::new(subscriptions.clone()),
            Arc::new(mock.clone()),
        );
        Fixture {
            mock,
            events,
            subscriptions,
            handler,
        }
    }

    fn signed(body: &[u8]) -> HandleChargifyWebhookCommand {
        HandleChargifyWebhookCommand {
            body: body.to_vec(),
            signature: Some(compute_test_signature(KEY, body)),
            webhook_id: None,
        }
    }

    // ══════════════════════════════════════════════════════════════
    // Signature
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn valid_signature_refreshes_subscription() {
        let fx = fixture(Some(ChargifyWebhookVerifier::new(KEY))).await;

        let result = fx.handler.handle(signed(BODY)).await.unwrap();

        assert_eq!(result, WebhookResult::Processed);
        let record = fx
            .subscriptions
            .find_by_id(SubscriptionId::new(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.snapshot.as_map().get("state"), Some(&json!("past_due")));
    }

    #[tokio::test]
    async fn invalid_signature_is_rejected() {
        let fx = fixture(Some(ChargifyWebhookVerifier::new(KEY))).await;
        let mut cmd = signed(BODY);
        cmd.signature = Some(compute_test_signature("other-key", BODY));

        let err = fx.handler.handle(cmd).await.unwrap_err();
        assert!(matches!(err, WebhookError::InvalidSignature));
        assert!(!fx.mock.was_called("get_subscription"));
    }

    #[tokio::test]
    async fn missing_signature_is_rejected() {
        let fx = fixture(Some(ChargifyWebhookVerifier::new(KEY))).await;
        let mut cmd = signed(BODY);
        cmd.signature = None;

        let err = fx.handler.handle(cmd).await.unwrap_err();
        assert!(matches!(err, WebhookError::MissingHeader(_)));
    }

    #[tokio::test]
    async fn without_verifier_signature_is_not_checked() {
        let fx = fixture(None).await;
        let cmd = HandleChargifyWebhookCommand {
            body: BODY.to_vec(),
            signature: None,
            webhook_id: None,
        };

        assert_eq!(fx.handler.handle(cmd).await.unwrap(), WebhookResult::Processed);
    }

    // ══════════════════════════════════════════════════════════════
    // Processing
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn duplicate_delivery_is_acknowledged_once() {
        let fx = fixture(None).await;

        fx.handler.handle(signed(BODY)).await.unwrap();
        let second = fx.handler.handle(signed(BODY)).await.unwrap();

        assert_eq!(second, WebhookResult::AlreadyProcessed);
        assert_eq!(fx.mock.call_count("get_subscription"), 1);
    }

    #[tokio::test]
    async fn unknown_subscription_is_ignored_and_recorded() {
        let fx = fixture(None).await;
        let body = b"id=82&event=signup_success&payload[subscription][id]=999";

        let result = fx.handler.handle(signed(body)).await.unwrap();

        assert_eq!(result, WebhookResult::Ignored);
        let record = fx.events.find_by_event_id("82").await.unwrap().unwrap();
        assert_eq!(record.result, "ignored");
    }

    #[tokio::test]
    async fn event_without_subscription_is_ignored() {
        let fx = fixture(None).await;
        let body = b"id=83&event=test&payload[chargify]=testing";

        assert_eq!(fx.handler.handle(signed(body)).await.unwrap(), WebhookResult::Ignored);
    }

    #[tokio::test]
    async fn id_header_is_used_when_body_has_no_id() {
        let fx = fixture(None).await;
        let body = b"event=renewal_success&payload[subscription][id]=1";
        let mut cmd = signed(body);
        cmd.webhook_id = Some("84".into());

        fx.handler.handle(cmd).await.unwrap();
        assert!(fx.events.find_by_event_id("84").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn missing_event_name_is_bad_request() {
        let fx = fixture(None).await;
        let err = fx.handler.handle(signed(b"id=85")).await.unwrap_err();
        assert!(matches!(err, WebhookError::MissingField("event")));
    }

    #[tokio::test]
    async fn provider_failure_is_retryable_and_not_recorded() {
        let fx = fixture(None).await;
        fx.mock
            .set_method_error("get_subscription", BillingError::network("timeout"));

        let err = fx.handler.handle(signed(BODY)).await.unwrap_err();

        assert!(err.is_retryable());
        assert!(fx.events.find_by_event_id("81").await.unwrap().is_none());
    }
}
