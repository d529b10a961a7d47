//! StartTrialHandler - Subscribes a user to the trial product.
//!
//! The trial length comes from the trial coupon given by the user, or from
//! the configured default coupon when none is given.

use std::sync::Arc;

use chrono::{Duration, Utc};

use super::{SubscribeCommand, SubscriptionService};
use crate::application::handlers::catalog::ProductCatalogService;
use crate::domain::coupon::{TrialCoupon, DEFAULT_TRIAL_DAYS};
use crate::domain::foundation::{DomainError, ErrorCode, UserId};
use crate::domain::subscription::SubscriptionRecord;
use crate::ports::TrialCouponRepository;

#[derive(Debug, Clone)]
pub struct StartTrialCommand {
    pub user_id: UserId,
    pub coupon_token: Option<String>,
}

pub struct StartTrialHandler {
    subscriptions: Arc<SubscriptionService>,
    catalog: Arc<ProductCatalogService>,
    coupons: Arc<dyn TrialCouponRepository>,
    default_token: Option<String>,
}

impl StartTrialHandler {
    pub fn new(
        subscriptions: Arc<SubscriptionService>,
        catalog: Arc<ProductCatalogService>,
        coupons: Arc<dyn TrialCouponRepository>,
        default_token: Option<String>,
    ) -> Self {
        Self {
            subscriptions,
            catalog,
            coupons,
            default_token,
        }
    }

    pub async fn handle(&self, cmd: StartTrialCommand) -> Result<SubscriptionRecord, DomainError> {
        if self
            .subscriptions
            .current_for_user(&cmd.user_id)
            .await?
            .is_some()
        {
            return Err(DomainError::new(
                ErrorCode::SubscriptionExists,
                format!("User {} already has a subscription", cmd.user_id),
            ));
        }

        let coupon = self.resolve_coupon(cmd.coupon_token.as_deref()).await?;
        let days = coupon
            .as_ref()
            .map(|c| c.duration(Utc::now().date_naive()))
            .unwrap_or(DEFAULT_TRIAL_DAYS);
        let product = self.catalog.trial().await?;

        self.subscriptions
            .subscribe(SubscribeCommand {
                user_id: cmd.user_id,
                product_handle: product.handle,
                coupon_code: None,
                trial_coupon: coupon,
                next_billing_at: Some(Utc::now() + Duration::days(i64::from(days))),
                expires_at: None,
                chargify_token: None,
            })
            .await
    }

    /// The given coupon must exist; a missing default coupon falls back to
    /// the default trial length.
    async fn resolve_coupon(&self, token: Option<&str>) -> Result<Option<TrialCoupon>, DomainError> {
        match token.map(str::trim).filter(|t| !t.is_empty()) {
            Some(token) => self
                .coupons
                .find_by_token(token)
                .await?
                .map(Some)
                .ok_or_else(|| {
                    DomainError::new(
                        ErrorCode::CouponNotFound,
                        format!("Unknown trial coupon '{}'", token),
                    )
                }),
            None => match &self.default_token {
                Some(token) => {
                    let coupon = self.coupons.find_by_token(token).await?;
                    if coupon.is_none() {
                        tracing::warn!(token = %token, "Default trial coupon not found");
                    }
                    Ok(coupon)
                }
                None => Ok(None),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::chargify::MockBillingProvider;
    use crate::adapters::memory::{InMemorySubscriptionRepository, InMemoryTrialCouponRepository};
    use crate::adapters::tracking::RecordingEventTracker;
    use serde_json::json;

    struct Fixture {
        mock: MockBillingProvider,
        coupons: InMemoryTrialCouponRepository,
        handler: StartTrialHandler,
    }

    fn fixture(default_token: Option<&str>) -> Fixture {
        let mock = MockBillingProvider::new();
        mock.add_family(
            json!({ "id": 10 }),
            vec![
                json!({ "id": 1, "handle": "monthly", "name": "Monthly" }),
                json!({ "id": 3, "handle": "trial", "name": "Trial" }),
            ],
        );
        let coupons = InMemoryTrialCouponRepository::new();
        let subscriptions = Arc::new(SubscriptionService::new(
            Arc::new(mock.clone()),
            Arc::new(InMemorySubscriptionRepository::new()),
            Arc::new(RecordingEventTracker::new()),
        ));
        let catalog = Arc::new(ProductCatalogService::new(
            Arc::new(mock.clone()),
            vec!["monthly".into()],
            "trial",
            std::time::Duration::from_secs(1200),
        ));
        let handler = StartTrialHandler::new(
            subscriptions,
            catalog,
            Arc::new(coupons.clone()),
            default_token.map(str::to_string),
        );
        Fixture {
            mock,
            coupons,
            handler,
        }
    }

    fn command(token: Option<&str>) -> StartTrialCommand {
        StartTrialCommand {
            user_id: UserId::new("42").unwrap(),
            coupon_token: token.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn trial_uses_coupon_duration() {
        let fx = fixture(None);
        let coupon = TrialCoupon::new("press", "press-2024")
            .unwrap()
            .with_number_of_days(60);
        fx.coupons.save(&coupon).await.unwrap();

        let record = fx.handler.handle(command(Some("press-2024"))).await.unwrap();

        assert_eq!(record.trial_coupon, Some(coupon));
        assert_eq!(record.snapshot.product_handle(), Some("trial"));
        let next = record.snapshot.next_assessment_at().unwrap();
        let days = (next.with_timezone(&Utc) - Utc::now()).num_days();
        assert!((59..=60).contains(&days), "{}", days);
    }

    #[tokio::test]
    async fn unknown_coupon_is_rejected() {
        let fx = fixture(None);
        let err = fx.handler.handle(command(Some("nope"))).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::CouponNotFound);
        assert!(!fx.mock.was_called("create_subscription"));
    }

    #[tokio::test]
    async fn default_coupon_applies_without_token() {
        let fx = fixture(Some("welcome"));
        let coupon = TrialCoupon::new("welcome", "welcome").unwrap();
        fx.coupons.save(&coupon).await.unwrap();

        let record = fx.handler.handle(command(None)).await.unwrap();
        assert_eq!(record.trial_coupon, Some(coupon));
    }

    #[tokio::test]
    async fn missing_default_coupon_falls_back_to_default_length() {
        let fx = fixture(Some("welcome"));

        let record = fx.handler.handle(command(None)).await.unwrap();
        assert!(record.trial_coupon.is_none());
    }

    #[tokio::test]
    async fn second_trial_is_refused() {
        let fx = fixture(None);
        fx.handler.handle(command(None)).await.unwrap();

        let err = fx.handler.handle(command(None)).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::SubscriptionExists);
    }
}
