//! Integration tests for the billing HTTP router.
//!
//! These tests drive the full axum router with in-memory repositories and the
//! mock Chargify provider:
//! 1. Webhook signature checks, de-duplication and snapshot refresh
//! 2. The Chargify Direct round trip (secure params, signed callback)
//! 3. Subscription views, trials and payment method updates

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha1::Sha1;
use sha2::Sha256;
use tower::ServiceExt;

use chargify_billing::adapters::http::{billing_router, BillingAppState};
use chargify_billing::adapters::{
    InMemoryNonceStore, InMemorySubscriptionRepository, InMemoryTrialCouponRepository,
    InMemoryWebhookEventRepository, MockBillingProvider, RecordingEventTracker,
};
use chargify_billing::application::{
    DirectFlowService, HandleChargifyWebhookHandler, ProductCatalogService, StartTrialHandler,
    SubscriptionService, UpdatePaymentMethodHandler,
};
use chargify_billing::domain::direct::{DirectSigner, SecureParams};
use chargify_billing::domain::foundation::{SubscriptionId, UserId};
use chargify_billing::domain::subscription::{SubscriptionRecord, SubscriptionSnapshot};
use chargify_billing::domain::webhook::ChargifyWebhookVerifier;
use chargify_billing::ports::SubscriptionRepository;

const SHARED_KEY: &str = "site-shared-key";
const API_ID: &str = "direct-api-id";
const API_SECRET: &str = "direct-api-secret";

// =============================================================================
// Test Infrastructure
// =============================================================================

struct TestApp {
    router: Router,
    provider: MockBillingProvider,
    subscriptions: InMemorySubscriptionRepository,
    webhook_events: InMemoryWebhookEventRepository,
}

fn test_app() -> TestApp {
    let provider = MockBillingProvider::new();
    provider.add_family(
        json!({ "id": 10, "handle": "plans" }),
        vec![
            json!({ "id": 1, "handle": "monthly", "name": "Monthly", "interval": 1, "interval_unit": "month" }),
            json!({ "id": 2, "handle": "yearly", "name": "Yearly", "interval": 12, "interval_unit": "month" }),
            json!({ "id": 3, "handle": "trial", "name": "Trial" }),
        ],
    );

    let subscriptions = InMemorySubscriptionRepository::new();
    let webhook_events = InMemoryWebhookEventRepository::new();
    let tracker = Arc::new(RecordingEventTracker::new());

    let subscription_service = Arc::new(SubscriptionService::new(
        Arc::new(provider.clone()),
        Arc::new(subscriptions.clone()),
        tracker.clone(),
    ));
    let catalog = Arc::new(ProductCatalogService::new(
        Arc::new(provider.clone()),
        vec!["yearly".to_string(), "monthly".to_string()],
        "trial",
        Duration::from_secs(1200),
    ));

    let state = BillingAppState {
        subscriptions: subscription_service.clone(),
        payment_method: Arc::new(UpdatePaymentMethodHandler::new(
            subscription_service.clone(),
            tracker,
        )),
        trials: Arc::new(StartTrialHandler::new(
            subscription_service,
            catalog.clone(),
            Arc::new(InMemoryTrialCouponRepository::new()),
            None,
        )),
        catalog,
        webhooks: Arc::new(HandleChargifyWebhookHandler::new(
            Some(ChargifyWebhookVerifier::new(SHARED_KEY)),
            Arc::new(webhook_events.clone()),
            Arc::new(subscriptions.clone()),
            Arc::new(provider.clone()),
        )),
        direct: Some(Arc::new(DirectFlowService::new(
            DirectSigner::new(API_ID, API_SECRET),
            Arc::new(InMemoryNonceStore::new()),
            Arc::new(provider.clone()),
            chrono::Duration::seconds(3600),
        ))),
        direct_redirect_uri: "https://billing.example.com/direct/callback".to_string(),
    };

    TestApp {
        router: billing_router(state, Duration::from_secs(30), &[]),
        provider,
        subscriptions,
        webhook_events,
    }
}

impl TestApp {
    /// Registers a subscription both on the mock provider and locally.
    async fn seed_subscription(&self, id: i64, user: &str, state: &str) {
        let snapshot = SubscriptionSnapshot::new(json!({
            "id": id,
            "state": state,
            "product": { "id": 1, "handle": "monthly", "interval": 1, "interval_unit": "month" },
            "customer": { "id": 500, "reference": user },
            "payment_collection_method": "remittance"
        }));
        self.provider.add_subscription(snapshot.clone());
        let record = SubscriptionRecord::new(
            SubscriptionId::new(id),
            UserId::new(user).unwrap(),
            snapshot,
        );
        self.subscriptions.save(&record).await.unwrap();
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, body)
    }
}

fn webhook_signature(body: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(SHARED_KEY.as_bytes()).unwrap();
    mac.update(body.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

fn webhook_request(body: &str, signature: &str) -> Request<Body> {
    Request::post("/webhooks/chargify")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .header("X-Chargify-Webhook-Signature-Hmac-Sha-256", signature)
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn json_request(method: &str, uri: &str, user: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(user) = user {
        builder = builder.header("X-User-Id", user);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, user: Option<&str>) -> Request<Body> {
    let mut builder = Request::get(uri);
    if let Some(user) = user {
        builder = builder.header("X-User-Id", user);
    }
    builder.body(Body::empty()).unwrap()
}

// =============================================================================
// Webhooks
// =============================================================================

#[tokio::test]
async fn webhook_refreshes_cached_subscription() {
    let app = test_app();
    app.seed_subscription(7, "42", "active").await;

    // Chargify now reports the subscription as past due
    app.provider.add_subscription(SubscriptionSnapshot::new(json!({
        "id": 7,
        "state": "past_due",
        "product": { "id": 1, "handle": "monthly" },
        "customer": { "id": 500, "reference": "42" }
    })));

    let body = "id=wh-1&event=payment_failure&payload[subscription][id]=7&payload[subscription][state]=past_due";
    let (status, json) = app.send(webhook_request(body, &webhook_signature(body))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "processed");

    let record = app
        .subscriptions
        .find_by_id(SubscriptionId::new(7))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.state().map(|s| s.as_str()), Some("past_due"));
    assert_eq!(app.webhook_events.len().await, 1);
}

#[tokio::test]
async fn webhook_redelivery_is_acknowledged_once() {
    let app = test_app();
    app.seed_subscription(7, "42", "active").await;

    let body = "id=wh-2&event=renewal_success&payload[subscription][id]=7";
    let signature = webhook_signature(body);

    let (_, first) = app.send(webhook_request(body, &signature)).await;
    let (status, second) = app.send(webhook_request(body, &signature)).await;

    assert_eq!(first["status"], "processed");
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["status"], "already_processed");
    assert_eq!(app.provider.call_count("get_subscription"), 1);
}

#[tokio::test]
async fn webhook_with_bad_signature_is_unauthorized() {
    let app = test_app();
    let body = "id=wh-3&event=test";

    let (status, json) = app.send(webhook_request(body, "deadbeef")).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error_code"], "WEBHOOK_ERROR");
    assert!(app.webhook_events.is_empty().await);
}

#[tokio::test]
async fn webhook_for_unknown_subscription_is_ignored() {
    let app = test_app();
    let body = "id=wh-4&event=signup_success&payload[subscription][id]=999";

    let (status, json) = app.send(webhook_request(body, &webhook_signature(body))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ignored");
    assert!(!app.provider.was_called("get_subscription"));
}

// =============================================================================
// Chargify Direct
// =============================================================================

async fn issue_secure_params(app: &TestApp) -> SecureParams {
    let request = json_request(
        "POST",
        "/direct/secure-params",
        Some("42"),
        json!({ "product_handle": "monthly" }),
    );
    let (status, json) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
    serde_json::from_value(json).unwrap()
}

fn callback_uri(params: &SecureParams, result_code: &str, call_id: &str) -> String {
    let mut mac = Hmac::<Sha1>::new_from_slice(API_SECRET.as_bytes()).unwrap();
    for part in [
        API_ID,
        params.secure_timestamp.as_str(),
        params.secure_nonce.as_str(),
        "200",
        result_code,
        call_id,
    ] {
        mac.update(part.as_bytes());
    }
    let signature = hex::encode(mac.finalize().into_bytes());

    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("api_id", API_ID)
        .append_pair("nonce", &params.secure_nonce)
        .append_pair("timestamp", &params.secure_timestamp)
        .append_pair("status_code", "200")
        .append_pair("result_code", result_code)
        .append_pair("call_id", call_id)
        .append_pair("signature", &signature)
        .finish();
    format!("/direct/callback?{}", query)
}

#[tokio::test]
async fn secure_params_bind_caller_and_configured_redirect() {
    let app = test_app();

    let params = issue_secure_params(&app).await;

    assert_eq!(params.secure_api_id, API_ID);
    assert_eq!(
        params.secure_data,
        "signup%5Bcustomer%5D%5Breference%5D=42\
         &signup%5Bproduct%5D%5Bhandle%5D=monthly\
         &redirect_uri=https%3A%2F%2Fbilling.example.com%2Fdirect%2Fcallback"
    );
}

#[tokio::test]
async fn secure_params_refuse_redirect_override() {
    let app = test_app();
    let request = json_request(
        "POST",
        "/direct/secure-params",
        Some("42"),
        json!({ "product_handle": "monthly", "redirect_uri": "https://attacker.example.com/" }),
    );

    let (status, json) = app.send(request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error_code"], "VALIDATION_FAILED");
}

#[tokio::test]
async fn secure_params_accept_configured_redirect() {
    let app = test_app();
    let request = json_request(
        "POST",
        "/direct/secure-params",
        Some("42"),
        json!({ "redirect_uri": "https://billing.example.com/direct/callback" }),
    );

    let (status, json) = app.send(request).await;

    assert_eq!(status, StatusCode::OK);
    assert!(json["secure_data"]
        .as_str()
        .unwrap()
        .starts_with("signup%5Bcustomer%5D%5Breference%5D=42&redirect_uri="));
}

#[tokio::test]
async fn secure_params_refuse_caller_supplied_form_data() {
    let app = test_app();
    let request = json_request(
        "POST",
        "/direct/secure-params",
        Some("42"),
        json!({ "data": [["signup[customer][reference]", "99"]] }),
    );

    let (status, _) = app.send(request).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn secure_params_for_unknown_product_are_not_found() {
    let app = test_app();
    let request = json_request(
        "POST",
        "/direct/secure-params",
        Some("42"),
        json!({ "product_handle": "lifetime" }),
    );

    let (status, json) = app.send(request).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error_code"], "PRODUCT_NOT_FOUND");
}

#[tokio::test]
async fn secure_params_require_user() {
    let app = test_app();
    let request = json_request("POST", "/direct/secure-params", None, json!({}));

    let (status, _) = app.send(request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn direct_callback_completes_once() {
    let app = test_app();
    app.provider.add_api_call(
        "call-1",
        json!({
            "id": "call-1",
            "response": {
                "result": { "status_code": "200", "result_code": "2000", "errors": [] },
                "subscriptioncardupdater": { "payment_profile": { "id": 77 } }
            }
        }),
    );
    let params = issue_secure_params(&app).await;
    let uri = callback_uri(&params, "2000", "call-1");

    let (status, json) = app.send(get(&uri, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "completed");
    assert_eq!(json["payment_profile"]["id"], 77);

    // The nonce was consumed
    let (status, json) = app.send(get(&uri, None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error_code"], "INVALID_CALLBACK");
}

#[tokio::test]
async fn direct_callback_reports_first_error() {
    let app = test_app();
    app.provider.add_api_call(
        "call-2",
        json!({
            "id": "call-2",
            "response": {
                "result": {
                    "status_code": "422",
                    "result_code": "4220",
                    "errors": [{ "message": "Credit card number: is invalid." }]
                }
            }
        }),
    );
    let params = issue_secure_params(&app).await;

    let (status, json) = app
        .send(get(&callback_uri(&params, "4220", "call-2"), None))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "rejected");
    assert_eq!(json["error"], "Credit card number: is invalid.");
}

#[tokio::test]
async fn direct_callback_with_forged_signature_is_rejected() {
    let app = test_app();
    let params = issue_secure_params(&app).await;
    let uri = callback_uri(&params, "2000", "call-1").replace("result_code=2000", "result_code=2001");

    let (status, _) = app.send(get(&uri, None)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(!app.provider.was_called("get_api_call"));
}

#[tokio::test]
async fn direct_callback_without_parameters_is_bad_request() {
    let app = test_app();

    let (status, _) = app.send(get("/direct/callback?call_id=x", None)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// =============================================================================
// Subscriptions & products
// =============================================================================

#[tokio::test]
async fn owner_sees_subscription_attributes() {
    let app = test_app();
    app.seed_subscription(7, "42", "active").await;

    let (status, json) = app.send(get("/subscriptions/7", Some("42"))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["id"], 7);
    assert_eq!(json["state"], "active");
    assert_eq!(json["plan_type"], "monthly");
}

#[tokio::test]
async fn other_users_subscription_is_not_found() {
    let app = test_app();
    app.seed_subscription(7, "42", "active").await;

    let (status, json) = app.send(get("/subscriptions/7", Some("43"))).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error_code"], "SUBSCRIPTION_NOT_FOUND");
}

#[tokio::test]
async fn other_users_uncached_subscription_is_not_fetched() {
    let app = test_app();
    app.seed_subscription(7, "42", "active").await;
    let mut record = app
        .subscriptions
        .find_by_id(SubscriptionId::new(7))
        .await
        .unwrap()
        .unwrap();
    record.replace_snapshot(SubscriptionSnapshot::empty());
    app.subscriptions.update(&record).await.unwrap();

    let (status, _) = app.send(get("/subscriptions/7", Some("43"))).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(!app.provider.was_called("get_subscription"));
    let stored = app
        .subscriptions
        .find_by_id(SubscriptionId::new(7))
        .await
        .unwrap()
        .unwrap();
    assert!(stored.needs_refresh());
}

#[tokio::test]
async fn trial_starts_on_trial_product() {
    let app = test_app();

    let request = json_request("POST", "/subscriptions/trial", Some("42"), json!({}));
    let (status, json) = app.send(request).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["user_id"], "42");
    assert_eq!(
        app.provider.last_args("create_subscription").unwrap()[1],
        "trial"
    );
    assert_eq!(app.subscriptions.len().await, 1);
}

#[tokio::test]
async fn payment_method_update_switches_to_automatic() {
    let app = test_app();
    app.seed_subscription(7, "42", "active").await;

    let request = json_request(
        "POST",
        "/subscriptions/7/payment-method",
        Some("42"),
        json!({ "payment_method": "credit_card", "chargify_token": "tok_123" }),
    );
    let (status, json) = app.send(request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["result"], "updated");
    assert!(app.provider.was_called("create_payment_profile"));

    let record = app
        .subscriptions
        .find_by_id(SubscriptionId::new(7))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        record.snapshot.payment_collection_method(),
        Some("automatic")
    );
}

#[tokio::test]
async fn payment_method_update_of_foreign_subscription_is_forbidden() {
    let app = test_app();
    app.seed_subscription(7, "42", "active").await;

    let request = json_request(
        "POST",
        "/subscriptions/7/payment-method",
        Some("43"),
        json!({ "payment_method": "paypal", "chargify_token": "tok_123" }),
    );
    let (status, _) = app.send(request).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(!app.provider.was_called("create_payment_profile"));
}

#[tokio::test]
async fn products_list_paying_in_configured_order() {
    let app = test_app();

    let (status, json) = app.send(get("/products", None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["paying"][0]["handle"], "yearly");
    assert_eq!(json["paying"][1]["handle"], "monthly");
    assert_eq!(json["trial"]["handle"], "trial");
}
