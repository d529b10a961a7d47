//! HTTP handlers for billing endpoints.
//!
//! These handlers connect Axum routes to the application services.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Json, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::application::{
    DirectFlowService, HandleChargifyWebhookCommand, HandleChargifyWebhookHandler,
    ProductCatalogService, StartTrialCommand, StartTrialHandler, SubscriptionService,
    UpdatePaymentMethodCommand, UpdatePaymentMethodHandler,
};
use crate::domain::customer::PaymentMethod;
use crate::domain::direct::DirectError;
use crate::domain::foundation::{DomainError, ErrorCode, SubscriptionId, UserId};
use crate::domain::webhook::{WebhookError, SIGNATURE_HEADER, WEBHOOK_ID_HEADER};
use crate::ports::WebhookResult;

use super::dto::{
    DirectCallbackResponse, ErrorResponse, ProductsResponse, SecureParamsRequest,
    StartTrialRequest, SubscriptionResponse, UpdatePaymentMethodRequest,
    UpdatePaymentMethodResponse,
};

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Shared state for the billing routes.
#[derive(Clone)]
pub struct BillingAppState {
    pub subscriptions: Arc<SubscriptionService>,
    pub payment_method: Arc<UpdatePaymentMethodHandler>,
    pub trials: Arc<StartTrialHandler>,
    pub catalog: Arc<ProductCatalogService>,
    pub webhooks: Arc<HandleChargifyWebhookHandler>,
    /// Absent when Chargify Direct credentials are not configured.
    pub direct: Option<Arc<DirectFlowService>>,
    /// Where Chargify redirects after a Direct form submission.
    pub direct_redirect_uri: String,
}

// ════════════════════════════════════════════════════════════════════════════════
// User Context
// ════════════════════════════════════════════════════════════════════════════════

/// Caller identity, read from the `X-User-Id` header set by the fronting
/// application.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
}

pub struct AuthenticationRequired;

impl IntoResponse for AuthenticationRequired {
    fn into_response(self) -> Response {
        let error = ErrorResponse::new("AUTHENTICATION_REQUIRED", "Authentication is required");
        (StatusCode::UNAUTHORIZED, Json(error)).into_response()
    }
}

#[axum::async_trait]
impl<S> axum::extract::FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AuthenticationRequired;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get("X-User-Id")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| UserId::new(s).ok())
            .ok_or(AuthenticationRequired)?;

        Ok(AuthenticatedUser { user_id })
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Webhooks
// ════════════════════════════════════════════════════════════════════════════════

/// POST /webhooks/chargify
pub async fn handle_chargify_webhook(
    State(state): State<BillingAppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, WebhookApiError> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    let cmd = HandleChargifyWebhookCommand {
        body: body.to_vec(),
        signature: header(SIGNATURE_HEADER),
        webhook_id: header(WEBHOOK_ID_HEADER),
    };

    let result = state.webhooks.handle(cmd).await?;
    let status = match result {
        WebhookResult::Processed => "processed",
        WebhookResult::Ignored => "ignored",
        WebhookResult::AlreadyProcessed => "already_processed",
    };
    Ok((StatusCode::OK, Json(serde_json::json!({ "status": status }))))
}

// ════════════════════════════════════════════════════════════════════════════════
// Chargify Direct
// ════════════════════════════════════════════════════════════════════════════════

/// POST /direct/secure-params
///
/// Only the configured callback URL is accepted as redirect target.
pub async fn create_secure_params(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
    Json(request): Json<SecureParamsRequest>,
) -> Result<impl IntoResponse, DirectApiError> {
    let direct = state.direct.as_ref().ok_or(DirectApiError::Disabled)?;
    if let Some(redirect_uri) = &request.redirect_uri {
        if *redirect_uri != state.direct_redirect_uri {
            return Err(
                DomainError::validation("redirect_uri", "Redirect URI cannot be overridden").into(),
            );
        }
    }

    let product_handle = match request.product_handle.as_deref().map(str::trim) {
        Some(handle) if !handle.is_empty() => Some(state.catalog.get(handle).await?.handle),
        _ => None,
    };

    let params = direct
        .secure_signup(
            &user.user_id,
            product_handle.as_deref(),
            &state.direct_redirect_uri,
        )
        .await?;
    Ok(Json(params))
}

/// GET /direct/callback
pub async fn direct_callback(
    State(state): State<BillingAppState>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, DirectApiError> {
    let direct = state.direct.as_ref().ok_or(DirectApiError::Disabled)?;
    let outcome = direct.handle_callback(&query).await?;
    Ok(Json(DirectCallbackResponse::from(outcome)))
}

// ════════════════════════════════════════════════════════════════════════════════
// Subscriptions & products
// ════════════════════════════════════════════════════════════════════════════════

/// POST /subscriptions/trial
pub async fn start_trial(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
    Json(request): Json<StartTrialRequest>,
) -> Result<impl IntoResponse, BillingApiError> {
    let cmd = StartTrialCommand {
        user_id: user.user_id,
        coupon_token: request.coupon_token,
    };
    let record = state.trials.handle(cmd).await?;
    Ok((StatusCode::CREATED, Json(SubscriptionResponse::from(&record))))
}

/// GET /subscriptions/:id
pub async fn get_subscription(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, BillingApiError> {
    // Another user's subscription gets the same answer as a missing one
    let record = state
        .subscriptions
        .load_owned(SubscriptionId::new(id), &user.user_id)
        .await?
        .ok_or_else(|| {
            DomainError::new(
                ErrorCode::SubscriptionNotFound,
                format!("Subscription {} not found", id),
            )
        })?;
    Ok(Json(SubscriptionResponse::from(&record)))
}

/// POST /subscriptions/:id/payment-method
pub async fn update_payment_method(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(request): Json<UpdatePaymentMethodRequest>,
) -> Result<impl IntoResponse, BillingApiError> {
    let payment_method: PaymentMethod = request
        .payment_method
        .parse()
        .map_err(DomainError::from)?;

    let cmd = UpdatePaymentMethodCommand {
        subscription_id: SubscriptionId::new(id),
        user_id: user.user_id,
        payment_method,
        chargify_token: request.chargify_token,
    };
    let result = state.payment_method.handle(cmd).await?;
    Ok(Json(UpdatePaymentMethodResponse::from(result)))
}

/// GET /products
pub async fn list_products(
    State(state): State<BillingAppState>,
) -> Result<impl IntoResponse, BillingApiError> {
    let response = ProductsResponse {
        paying: state.catalog.paying().await?,
        trial: state.catalog.trial().await?,
    };
    Ok(Json(response))
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// Converts domain errors to HTTP responses.
pub struct BillingApiError(DomainError);

impl From<DomainError> for BillingApiError {
    fn from(err: DomainError) -> Self {
        Self(err)
    }
}

impl IntoResponse for BillingApiError {
    fn into_response(self) -> Response {
        let status = match self.0.code {
            ErrorCode::ValidationFailed | ErrorCode::EmptyField | ErrorCode::InvalidFormat => {
                StatusCode::BAD_REQUEST
            }
            ErrorCode::SubscriptionNotFound
            | ErrorCode::CustomerNotFound
            | ErrorCode::ProductNotFound
            | ErrorCode::CouponNotFound => StatusCode::NOT_FOUND,
            ErrorCode::SubscriptionExists => StatusCode::CONFLICT,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::PaymentRejected => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCode::BillingProviderError => StatusCode::BAD_GATEWAY,
            ErrorCode::DatabaseError | ErrorCode::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        if status.is_server_error() {
            tracing::error!(error = %self.0, "Billing request failed");
        }

        let details: BTreeMap<String, String> = self.0.details.into_iter().collect();
        let body = ErrorResponse::new(self.0.code.to_string(), self.0.message).with_details(details);
        (status, Json(body)).into_response()
    }
}

pub struct WebhookApiError(WebhookError);

impl From<WebhookError> for WebhookApiError {
    fn from(err: WebhookError) -> Self {
        Self(err)
    }
}

impl IntoResponse for WebhookApiError {
    fn into_response(self) -> Response {
        let status = self.0.status_code();
        if status.is_server_error() {
            tracing::error!(
                error = %self.0,
                retryable = self.0.is_retryable(),
                "Webhook processing failed"
            );
        } else {
            tracing::warn!(error = %self.0, status = status.as_u16(), "Webhook rejected");
        }
        let body = ErrorResponse::new("WEBHOOK_ERROR", self.0.to_string());
        (status, Json(body)).into_response()
    }
}

pub enum DirectApiError {
    /// Chargify Direct is not configured.
    Disabled,
    Direct(DirectError),
    Request(DomainError),
}

impl From<DomainError> for DirectApiError {
    fn from(err: DomainError) -> Self {
        Self::Request(err)
    }
}

impl From<DirectError> for DirectApiError {
    fn from(err: DirectError) -> Self {
        Self::Direct(err)
    }
}

impl IntoResponse for DirectApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            DirectApiError::Request(err) => return BillingApiError::from(err).into_response(),
            DirectApiError::Disabled => (
                StatusCode::NOT_FOUND,
                ErrorResponse::new("DIRECT_DISABLED", "Chargify Direct is not configured"),
            ),
            DirectApiError::Direct(err) => {
                let code = if err.is_invalid_callback() {
                    "INVALID_CALLBACK"
                } else {
                    "DIRECT_ERROR"
                };
                (err.status_code(), ErrorResponse::new(code, err.to_string()))
            }
        };
        (status, Json(body)).into_response()
    }
}
