//! Local subscription record backed by a cached Chargify snapshot.
//!
//! The record persists only what Chargify does not know about (owner, hold
//! dates, trial coupon). Everything else is read from the cached snapshot,
//! which the application layer refreshes when it is empty or when Chargify
//! notifies a change.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{SubscriptionSnapshot, SubscriptionState};
use crate::domain::coupon::TrialCoupon;
use crate::domain::foundation::{SubscriptionId, UserId};

/// A credit card is considered active if it expires after this many days.
pub const CARD_EXPIRY_MARGIN_DAYS: i64 = 35;

/// Billing plan periodicity derived from the product interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanType {
    Monthly,
    Yearly,
}

impl PlanType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanType::Monthly => "monthly",
            PlanType::Yearly => "yearly",
        }
    }

    /// Maps a Chargify product interval to a plan type.
    pub fn from_interval(unit: Option<&str>, length: Option<i64>) -> Option<Self> {
        match (unit, length) {
            (Some("month"), Some(1)) => Some(PlanType::Monthly),
            (Some("month"), Some(12)) => Some(PlanType::Yearly),
            _ => None,
        }
    }
}

/// Subscription record.
///
/// # Invariants
///
/// - `id` is the Chargify subscription id and is unique
/// - an empty `snapshot` means "not loaded yet", never "no data"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    /// Chargify subscription id.
    pub id: SubscriptionId,

    /// Owner of the subscription.
    pub user_id: UserId,

    /// Last known Chargify state for this subscription.
    pub snapshot: SubscriptionSnapshot,

    pub hold_start_date: Option<NaiveDate>,
    pub hold_end_date: Option<NaiveDate>,

    /// Coupon the trial was started with.
    pub trial_coupon: Option<TrialCoupon>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SubscriptionRecord {
    /// Creates a record for a freshly created Chargify subscription.
    pub fn new(id: SubscriptionId, user_id: UserId, snapshot: SubscriptionSnapshot) -> Self {
        let now = Utc::now();
        Self {
            id,
            user_id,
            snapshot,
            hold_start_date: None,
            hold_end_date: None,
            trial_coupon: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_trial_coupon(mut self, coupon: TrialCoupon) -> Self {
        self.trial_coupon = Some(coupon);
        self
    }

    /// The cache has never been filled (or was cleared).
    pub fn needs_refresh(&self) -> bool {
        self.snapshot.is_empty()
    }

    /// Replaces the cached snapshot.
    pub fn replace_snapshot(&mut self, snapshot: SubscriptionSnapshot) {
        self.snapshot = snapshot;
        self.updated_at = Utc::now();
    }

    pub fn clear_snapshot(&mut self) {
        self.replace_snapshot(SubscriptionSnapshot::empty());
    }

    pub fn set_hold_period(&mut self, start: NaiveDate, end: NaiveDate) {
        self.hold_start_date = Some(start);
        self.hold_end_date = Some(end);
        self.updated_at = Utc::now();
    }

    pub fn clear_hold_period(&mut self) {
        self.hold_start_date = None;
        self.hold_end_date = None;
        self.updated_at = Utc::now();
    }

    // ════════════════════════════════════════════════════════════════════════════
    // State predicates
    // ════════════════════════════════════════════════════════════════════════════

    pub fn state(&self) -> Option<SubscriptionState> {
        self.snapshot.state()
    }

    fn is(&self, state: SubscriptionState) -> bool {
        self.state() == Some(state)
    }

    pub fn is_active(&self) -> bool {
        self.is(SubscriptionState::Active)
    }

    pub fn is_trialing(&self) -> bool {
        self.is(SubscriptionState::Trialing)
    }

    pub fn is_trial_ended(&self) -> bool {
        self.is(SubscriptionState::TrialEnded)
    }

    pub fn is_canceled(&self) -> bool {
        self.is(SubscriptionState::Canceled)
    }

    pub fn is_on_hold(&self) -> bool {
        self.is(SubscriptionState::OnHold)
    }

    pub fn is_past_due(&self) -> bool {
        self.is(SubscriptionState::PastDue)
    }

    pub fn is_running(&self) -> bool {
        self.state().map(|s| s.is_running()).unwrap_or(false)
    }

    pub fn pending_cancellation(&self) -> bool {
        self.snapshot.pending_cancellation()
    }

    /// The subscriber has left the trial for a paid lifecycle state.
    pub fn is_converted(&self) -> bool {
        match self.state() {
            Some(SubscriptionState::Trialing)
            | Some(SubscriptionState::TrialEnded)
            | Some(SubscriptionState::Unknown)
            | None => false,
            Some(_) => true,
        }
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Derived values
    // ════════════════════════════════════════════════════════════════════════════

    /// Whole days from `now` until `to`, zero if `to` is missing or not in
    /// the future. `to` is compared on its own wall clock.
    pub fn count_days_from_now(to: Option<DateTime<FixedOffset>>, now: NaiveDateTime) -> i64 {
        match to {
            Some(to) => {
                let to = to.naive_local();
                if to <= now {
                    0
                } else {
                    (to - now).num_days()
                }
            }
            None => 0,
        }
    }

    pub fn remaining_trial_days(&self, now: NaiveDateTime) -> i64 {
        Self::count_days_from_now(self.snapshot.trial_ended_at(), now)
    }

    pub fn remaining_days_in_current_period(&self, now: NaiveDateTime) -> i64 {
        Self::count_days_from_now(self.snapshot.current_period_ends_at(), now)
    }

    /// Days before the next change: end of trial while trialing (or just
    /// after), end of the billing period otherwise.
    pub fn remaining_days(&self, now: NaiveDateTime) -> i64 {
        if self.is_trialing() || self.is_trial_ended() {
            self.remaining_trial_days(now)
        } else {
            self.remaining_days_in_current_period(now)
        }
    }

    /// Plan periodicity, only once converted.
    pub fn plan_type(&self) -> Option<PlanType> {
        if !self.is_converted() {
            return None;
        }
        PlanType::from_interval(
            self.snapshot.plan_interval_unit(),
            self.snapshot.plan_interval_length(),
        )
    }

    /// `"monthly"`, `"yearly"` or `""`.
    pub fn plan_type_name(&self) -> &'static str {
        self.plan_type().map(|p| p.as_str()).unwrap_or("")
    }

    /// The card on file expires strictly more than 35 days after `today`.
    pub fn credit_card_is_active(&self, today: NaiveDate) -> bool {
        match self.snapshot.credit_card_expiration_date() {
            Some(expiration) => expiration > today + Duration::days(CARD_EXPIRY_MARGIN_DAYS),
            None => false,
        }
    }
}

impl fmt::Display for SubscriptionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self
            .state()
            .map(|s| s.as_str())
            .unwrap_or("");

        if self.is_trialing() {
            let end = self
                .snapshot
                .trial_ended_at()
                .map(|d| d.format("%d/%m/%Y").to_string())
                .unwrap_or_else(|| "-".to_string());
            let coupon = self
                .trial_coupon
                .as_ref()
                .map(|c| c.codename.as_str())
                .unwrap_or("-");
            write!(f, "{} - trial ends {} - coupon {}", state, end, coupon)
        } else {
            write!(f, "{} - ID: {}", state, self.id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(snapshot: serde_json::Value) -> SubscriptionRecord {
        SubscriptionRecord::new(
            SubscriptionId::new(15236),
            UserId::new("42").unwrap(),
            SubscriptionSnapshot::new(snapshot),
        )
    }

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    // ══════════════════════════════════════════════════════════════
    // Predicates
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn state_predicates_follow_snapshot() {
        let r = record(json!({"state": "active"}));
        assert!(r.is_active());
        assert!(r.is_running());
        assert!(!r.is_trialing());

        let r = record(json!({"state": "on_hold"}));
        assert!(r.is_on_hold());
        assert!(!r.is_running());

        let r = record(json!({"state": "past_due"}));
        assert!(r.is_past_due());
        assert!(r.is_running());

        let r = record(json!({"state": "canceled"}));
        assert!(r.is_canceled());
        assert!(!r.is_running());
    }

    #[test]
    fn empty_snapshot_is_in_no_state() {
        let r = record(json!({}));
        assert!(r.needs_refresh());
        assert!(r.state().is_none());
        assert!(!r.is_running());
        assert!(!r.pending_cancellation());
    }

    // ══════════════════════════════════════════════════════════════
    // Remaining days
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn count_days_is_zero_for_missing_or_past_dates() {
        let now = at("2024-03-01 12:00:00");
        assert_eq!(SubscriptionRecord::count_days_from_now(None, now), 0);

        let past = DateTime::parse_from_rfc3339("2024-02-01T00:00:00+00:00").unwrap();
        assert_eq!(SubscriptionRecord::count_days_from_now(Some(past), now), 0);

        let same = DateTime::parse_from_rfc3339("2024-03-01T12:00:00+00:00").unwrap();
        assert_eq!(SubscriptionRecord::count_days_from_now(Some(same), now), 0);
    }

    #[test]
    fn count_days_truncates_partial_days() {
        let now = at("2024-03-01 12:00:00");
        let to = DateTime::parse_from_rfc3339("2024-03-11T11:00:00+01:00").unwrap();
        assert_eq!(SubscriptionRecord::count_days_from_now(Some(to), now), 9);
    }

    #[test]
    fn remaining_days_uses_trial_end_while_trialing() {
        let r = record(json!({
            "state": "trialing",
            "trial_ended_at": "2024-03-15T12:00:00+00:00",
            "current_period_ends_at": "2024-03-31T12:00:00+00:00"
        }));
        assert_eq!(r.remaining_days(at("2024-03-01 12:00:00")), 14);
    }

    #[test]
    fn remaining_days_uses_period_end_when_active() {
        let r = record(json!({
            "state": "active",
            "trial_ended_at": "2024-03-15T12:00:00+00:00",
            "current_period_ends_at": "2024-03-31T12:00:00+00:00"
        }));
        assert_eq!(r.remaining_days(at("2024-03-01 12:00:00")), 30);
        assert_eq!(r.remaining_trial_days(at("2024-03-01 12:00:00")), 14);
    }

    // ══════════════════════════════════════════════════════════════
    // Plan type and card
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn plan_type_name_requires_conversion() {
        let product = json!({"interval_unit": "month", "interval": 12});
        let r = record(json!({"state": "active", "product": product.clone()}));
        assert_eq!(r.plan_type_name(), "yearly");

        let r = record(json!({"state": "trialing", "product": product}));
        assert_eq!(r.plan_type_name(), "");

        let r = record(json!({"state": "active", "product": {"interval_unit": "month", "interval": 1}}));
        assert_eq!(r.plan_type_name(), "monthly");

        let r = record(json!({"state": "active", "product": {"interval_unit": "day", "interval": 30}}));
        assert_eq!(r.plan_type_name(), "");
    }

    #[test]
    fn credit_card_active_needs_35_days_margin() {
        let r = record(json!({"credit_card": {"expiration_month": 4, "expiration_year": 2024}}));
        // Card expires 2024-04-30.
        assert!(r.credit_card_is_active(date(2024, 3, 25)));
        assert!(!r.credit_card_is_active(date(2024, 3, 26)));
    }

    #[test]
    fn credit_card_missing_is_inactive() {
        let r = record(json!({"state": "active"}));
        assert!(!r.credit_card_is_active(date(2024, 3, 1)));
        let r = record(json!({"credit_card": {"expiration_month": "x", "expiration_year": 2024}}));
        assert!(!r.credit_card_is_active(date(2024, 3, 1)));
    }

    // ══════════════════════════════════════════════════════════════
    // Cache and display
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn clear_snapshot_marks_record_for_refresh() {
        let mut r = record(json!({"state": "active"}));
        assert!(!r.needs_refresh());
        r.clear_snapshot();
        assert!(r.needs_refresh());
    }

    #[test]
    fn display_for_running_subscription_shows_id() {
        let r = record(json!({"state": "active"}));
        assert_eq!(r.to_string(), "active - ID: 15236");
    }

    #[test]
    fn display_for_trial_shows_end_date_and_coupon() {
        let coupon = TrialCoupon::new("welcome", "BRIEF2020").unwrap();
        let r = record(json!({
            "state": "trialing",
            "trial_ended_at": "2024-03-15T12:00:00+01:00"
        }))
        .with_trial_coupon(coupon);
        assert_eq!(r.to_string(), "trialing - trial ends 15/03/2024 - coupon welcome");
    }
}
