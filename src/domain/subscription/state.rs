//! Chargify subscription states.
//!
//! Chargify owns the lifecycle; the local side only reads the state from the
//! cached snapshot, so no transition rules are enforced here.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Subscription state as reported by Chargify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionState {
    /// Within the free trial period.
    Trialing,

    /// Trial period over and no payment method on file.
    TrialEnded,

    /// Paid and current.
    Active,

    /// Paused until a resume date.
    OnHold,

    /// A renewal failed and dunning is in progress.
    SoftFailure,

    /// Renewal failed, balance outstanding, still served.
    PastDue,

    /// Canceled by the customer or the merchant.
    Canceled,

    /// Dunning exhausted without payment.
    Unpaid,

    /// Reached its expiration date.
    Expired,

    /// Any value Chargify may add later.
    #[serde(other)]
    Unknown,
}

impl SubscriptionState {
    /// Every known state, in the order Chargify documents them.
    pub const ALL: [SubscriptionState; 9] = [
        SubscriptionState::Trialing,
        SubscriptionState::TrialEnded,
        SubscriptionState::Active,
        SubscriptionState::OnHold,
        SubscriptionState::SoftFailure,
        SubscriptionState::PastDue,
        SubscriptionState::Canceled,
        SubscriptionState::Unpaid,
        SubscriptionState::Expired,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionState::Trialing => "trialing",
            SubscriptionState::TrialEnded => "trial_ended",
            SubscriptionState::Active => "active",
            SubscriptionState::OnHold => "on_hold",
            SubscriptionState::SoftFailure => "soft_failure",
            SubscriptionState::PastDue => "past_due",
            SubscriptionState::Canceled => "canceled",
            SubscriptionState::Unpaid => "unpaid",
            SubscriptionState::Expired => "expired",
            SubscriptionState::Unknown => "unknown",
        }
    }

    /// Trialing, active or past due: the customer is still served.
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            SubscriptionState::Trialing | SubscriptionState::Active | SubscriptionState::PastDue
        )
    }

    /// States in which a new payment method triggers a reactivation.
    pub fn needs_reactivation(&self) -> bool {
        matches!(self, SubscriptionState::TrialEnded | SubscriptionState::Canceled)
    }
}

impl FromStr for SubscriptionState {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(SubscriptionState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .unwrap_or(SubscriptionState::Unknown))
    }
}

impl fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
