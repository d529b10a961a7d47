//! SubscriptionService - Subscription lifecycle over Chargify with a local
//! snapshot cache.
//!
//! Every operation that changes the subscription on Chargify refreshes the
//! cached snapshot afterwards, either from the provider's response or by
//! fetching the subscription again.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{json, Map};

use crate::domain::coupon::TrialCoupon;
use crate::domain::foundation::{DomainError, ErrorCode, SubscriptionId, UserId};
use crate::domain::subscription::{SubscriptionRecord, SubscriptionSnapshot, SubscriptionState};
use crate::ports::{
    BillingProvider, CancelMode, CreateSubscriptionRequest, EventTracker, SubscriptionRepository,
};

/// Analytics label sent after a reactivation.
pub const REACTIVATE_EVENT: &str = "Subscription reactivated";

/// Command to create a Chargify subscription for a local user.
#[derive(Debug, Clone)]
pub struct SubscribeCommand {
    pub user_id: UserId,
    pub product_handle: String,
    pub coupon_code: Option<String>,
    pub trial_coupon: Option<TrialCoupon>,
    pub next_billing_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub chargify_token: Option<String>,
}

pub struct SubscriptionService {
    provider: Arc<dyn BillingProvider>,
    repository: Arc<dyn SubscriptionRepository>,
    tracker: Arc<dyn EventTracker>,
}

impl SubscriptionService {
    pub fn new(
        provider: Arc<dyn BillingProvider>,
        repository: Arc<dyn SubscriptionRepository>,
        tracker: Arc<dyn EventTracker>,
    ) -> Self {
        Self {
            provider,
            repository,
            tracker,
        }
    }

    pub fn provider(&self) -> &Arc<dyn BillingProvider> {
        &self.provider
    }

    /// Loads a record, filling its snapshot from Chargify when empty.
    pub async fn load(&self, id: SubscriptionId) -> Result<SubscriptionRecord, DomainError> {
        let mut record = self.repository.find_by_id(id).await?.ok_or_else(|| {
            DomainError::new(
                ErrorCode::SubscriptionNotFound,
                format!("Subscription {} not found", id),
            )
        })?;

        if record.needs_refresh() {
            self.refresh_cache(&mut record, None).await?;
        }
        Ok(record)
    }

    /// Loads a record owned by `user_id`.
    ///
    /// Returns `None` for another user's subscription without touching
    /// Chargify or the cache.
    pub async fn load_owned(
        &self,
        id: SubscriptionId,
        user_id: &UserId,
    ) -> Result<Option<SubscriptionRecord>, DomainError> {
        let mut record = self.repository.find_by_id(id).await?.ok_or_else(|| {
            DomainError::new(
                ErrorCode::SubscriptionNotFound,
                format!("Subscription {} not found", id),
            )
        })?;
        if record.user_id != *user_id {
            return Ok(None);
        }

        if record.needs_refresh() {
            self.refresh_cache(&mut record, None).await?;
        }
        Ok(Some(record))
    }

    /// Most recent subscription of a user.
    pub async fn current_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<SubscriptionRecord>, DomainError> {
        let Some(mut record) = self.repository.find_by_user_id(user_id).await?.into_iter().next()
        else {
            return Ok(None);
        };
        if record.needs_refresh() {
            self.refresh_cache(&mut record, None).await?;
        }
        Ok(Some(record))
    }

    /// Replaces the cached snapshot with `fresh`, or with the subscription
    /// fetched from Chargify when `fresh` is absent or empty, and persists
    /// the record. A subscription unknown to Chargify leaves an empty cache.
    pub async fn refresh_cache(
        &self,
        record: &mut SubscriptionRecord,
        fresh: Option<SubscriptionSnapshot>,
    ) -> Result<(), DomainError> {
        let snapshot = match fresh.filter(|s| !s.is_empty()) {
            Some(snapshot) => snapshot,
            None => self
                .provider
                .get_subscription(record.id)
                .await?
                .unwrap_or_default(),
        };

        record.replace_snapshot(snapshot);
        self.repository.update(record).await?;
        tracing::debug!(subscription_id = %record.id, state = ?record.state(), "Subscription cache refreshed");
        Ok(())
    }

    pub async fn clear_cache(&self, record: &mut SubscriptionRecord) -> Result<(), DomainError> {
        record.clear_snapshot();
        self.repository.update(record).await
    }

    /// Creates the subscription on Chargify and persists its local record.
    pub async fn subscribe(&self, cmd: SubscribeCommand) -> Result<SubscriptionRecord, DomainError> {
        let request = CreateSubscriptionRequest {
            customer_reference: cmd.user_id.to_string(),
            product_handle: cmd.product_handle.clone(),
            coupon_code: cmd.coupon_code,
            next_billing_at: cmd.next_billing_at,
            expires_at: cmd.expires_at,
            chargify_token: cmd.chargify_token,
        };
        let snapshot = self.provider.create_subscription(request).await?;
        let id = snapshot.id().ok_or_else(|| {
            DomainError::new(
                ErrorCode::BillingProviderError,
                "Chargify returned a subscription without id",
            )
        })?;

        let mut record = SubscriptionRecord::new(id, cmd.user_id, snapshot);
        if let Some(coupon) = cmd.trial_coupon {
            record = record.with_trial_coupon(coupon);
        }
        self.repository.save(&record).await?;

        tracing::info!(
            subscription_id = %id,
            user_id = %record.user_id,
            product_handle = %cmd.product_handle,
            "Subscription created"
        );
        Ok(record)
    }

    /// Reactivates a canceled or trial-ended subscription.
    ///
    /// With `send_event` the reactivation is tracked, except when the
    /// subscription was leaving its trial.
    pub async fn reactivate(
        &self,
        record: &mut SubscriptionRecord,
        include_trial: bool,
        send_event: bool,
    ) -> Result<(), DomainError> {
        let previous_state = record.state();
        let snapshot = self.provider.reactivate(record.id, include_trial).await?;
        self.refresh_cache(record, Some(snapshot)).await?;

        if send_event && previous_state != Some(SubscriptionState::TrialEnded) {
            let mut properties = Map::new();
            properties.insert(
                "previous_state".into(),
                json!(previous_state.map(|s| s.as_str())),
            );
            properties.insert("plan_label".into(), json!(record.snapshot.plan_name()));
            self.tracker
                .track(&record.user_id, REACTIVATE_EVENT, properties)
                .await;
        }
        Ok(())
    }

    pub async fn delete_payment_profile(
        &self,
        record: &SubscriptionRecord,
        payment_profile_id: i64,
    ) -> Result<(), DomainError> {
        self.provider
            .delete_payment_profile(record.id, payment_profile_id)
            .await?;
        Ok(())
    }

    /// Moves the subscription to `product_handle`, now or at the next renewal.
    pub async fn change_product(
        &self,
        record: &mut SubscriptionRecord,
        product_handle: &str,
        delayed: bool,
    ) -> Result<(), DomainError> {
        let snapshot = self
            .provider
            .set_product(record.id, product_handle, delayed)
            .await?;
        self.refresh_cache(record, Some(snapshot)).await
    }

    pub async fn cancel_delayed_product_change(
        &self,
        record: &mut SubscriptionRecord,
    ) -> Result<(), DomainError> {
        self.provider.cancel_delayed_product_change(record.id).await?;
        self.refresh_cache(record, None).await
    }

    pub async fn cancel(
        &self,
        record: &mut SubscriptionRecord,
        mode: CancelMode,
    ) -> Result<(), DomainError> {
        self.provider.cancel_subscription(record.id, mode).await?;
        self.refresh_cache(record, None).await
    }

    pub async fn cancel_pending_cancellation(
        &self,
        record: &mut SubscriptionRecord,
    ) -> Result<(), DomainError> {
        self.provider.cancel_pending_cancellation(record.id).await?;
        self.refresh_cache(record, None).await
    }

    /// Puts the subscription on hold until `resume_at`.
    pub async fn hold(
        &self,
        record: &mut SubscriptionRecord,
        start: NaiveDate,
        resume_at: NaiveDate,
    ) -> Result<(), DomainError> {
        if resume_at <= start {
            return Err(DomainError::validation(
                "hold_end_date",
                "must be after the hold start date",
            ));
        }
        self.provider.hold(record.id, resume_at).await?;
        record.set_hold_period(start, resume_at);
        self.refresh_cache(record, None).await
    }

    pub async fn resume(&self, record: &mut SubscriptionRecord) -> Result<(), DomainError> {
        self.provider.resume(record.id).await?;
        record.clear_hold_period();
        self.refresh_cache(record, None).await
    }

    pub async fn add_coupon(
        &self,
        record: &mut SubscriptionRecord,
        coupon_code: &str,
    ) -> Result<(), DomainError> {
        let snapshot = self.provider.add_coupon(record.id, coupon_code).await?;
        self.refresh_cache(record, Some(snapshot)).await
    }

    pub async fn remove_coupon(&self, record: &mut SubscriptionRecord) -> Result<(), DomainError> {
        self.provider.remove_coupon(record.id).await?;
        self.refresh_cache(record, None).await
    }
}
