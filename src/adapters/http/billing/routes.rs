//! Axum router configuration for billing endpoints.

use std::time::Duration;

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use super::handlers::{
    create_secure_params, direct_callback, get_subscription, handle_chargify_webhook,
    list_products, start_trial, update_payment_method, BillingAppState,
};

/// Create the billing API router.
///
/// # Routes
///
/// ## Chargify (no user auth; signature or nonce verified)
/// - `POST /webhooks/chargify` - Webhook deliveries
/// - `GET /direct/callback` - Chargify Direct redirect target
///
/// ## User endpoints (`X-User-Id` required)
/// - `POST /direct/secure-params` - Signed parameters for a Direct form
/// - `POST /subscriptions/trial` - Start a trial, optionally with a coupon
/// - `GET /subscriptions/:id` - Subscription with proxied attributes
/// - `POST /subscriptions/:id/payment-method` - Attach a Chargify.js token
///
/// ## Public
/// - `GET /products` - Paying and trial products
pub fn billing_routes() -> Router<BillingAppState> {
    Router::new()
        .route("/webhooks/chargify", post(handle_chargify_webhook))
        .route("/direct/callback", get(direct_callback))
        .route("/direct/secure-params", post(create_secure_params))
        .route("/subscriptions/trial", post(start_trial))
        .route("/subscriptions/:id", get(get_subscription))
        .route("/subscriptions/:id/payment-method", post(update_payment_method))
        .route("/products", get(list_products))
}

/// Billing routes with state, tracing, timeout and CORS layers applied.
pub fn billing_router(
    state: BillingAppState,
    request_timeout: Duration,
    cors_origins: &[String],
) -> Router {
    let origins: Vec<HeaderValue> = cors_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static("x-user-id"),
        ]);

    billing_routes()
        .with_state(state)
        .layer(cors)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
}
