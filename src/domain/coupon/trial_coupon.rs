//! Trial coupons handed out to prospects to start a free trial.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::foundation::ValidationError;

/// Default trial length when a coupon has no fixed expiration date.
pub const DEFAULT_TRIAL_DAYS: u32 = 30;

/// A promotional code granting a trial period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialCoupon {
    /// Internal slug, used in analytics.
    pub codename: String,

    /// Code typed by the prospect.
    pub token: String,

    /// Trial length in days.
    pub number_of_days: u32,

    /// Fixed end date; takes precedence over `number_of_days`.
    pub expires_at: Option<NaiveDate>,

    pub welcome_message: Option<String>,
    pub landing_message: Option<String>,
    pub partner_label: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TrialCoupon {
    /// Creates a coupon with the default trial length.
    pub fn new(
        codename: impl Into<String>,
        token: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let codename = codename.into();
        let token = token.into();
        if codename.trim().is_empty() {
            return Err(ValidationError::empty_field("codename"));
        }
        if token.trim().is_empty() {
            return Err(ValidationError::empty_field("token"));
        }
        if !is_slug(&codename) {
            return Err(ValidationError::invalid_format("codename", "must be a slug"));
        }
        if !is_slug(&token) {
            return Err(ValidationError::invalid_format("token", "must be a slug"));
        }

        let now = Utc::now();
        Ok(Self {
            codename,
            token,
            number_of_days: DEFAULT_TRIAL_DAYS,
            expires_at: None,
            welcome_message: None,
            landing_message: None,
            partner_label: String::new(),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn with_number_of_days(mut self, days: u32) -> Self {
        self.number_of_days = days;
        self
    }

    pub fn with_expires_at(mut self, expires_at: NaiveDate) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Trial length granted today, in days.
    ///
    /// A fixed expiration date wins over `number_of_days` and never yields
    /// a negative duration.
    pub fn duration(&self, today: NaiveDate) -> u32 {
        match self.expires_at {
            Some(expires_at) => {
                let days = (expires_at - today).num_days();
                u32::try_from(days.max(0)).unwrap_or(u32::MAX)
            }
            None => self.number_of_days,
        }
    }
}

fn is_slug(value: &str) -> bool {
    value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

impl fmt::Display for TrialCoupon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {} - {} days",
            self.codename, self.token, self.number_of_days
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn defaults_to_thirty_days() {
        let coupon = TrialCoupon::new("spring-campaign", "SPRING2024").unwrap();
        assert_eq!(coupon.number_of_days, 30);
        assert_eq!(coupon.duration(date(2024, 3, 1)), 30);
    }

    #[test]
    fn expiration_date_takes_precedence() {
        let coupon = TrialCoupon::new("partner", "PARTNER")
            .unwrap()
            .with_number_of_days(60)
            .with_expires_at(date(2024, 3, 11));
        assert_eq!(coupon.duration(date(2024, 3, 1)), 10);
    }

    #[test]
    fn expired_coupon_has_zero_duration() {
        let coupon = TrialCoupon::new("old", "OLD")
            .unwrap()
            .with_expires_at(date(2023, 12, 31));
        assert_eq!(coupon.duration(date(2024, 1, 15)), 0);
    }

    #[test]
    fn rejects_non_slug_token() {
        assert!(TrialCoupon::new("ok", "NOT A SLUG").is_err());
        assert!(TrialCoupon::new("", "TOKEN").is_err());
    }

    #[test]
    fn displays_codename_token_and_days() {
        let coupon = TrialCoupon::new("welcome", "BRIEF2020")
            .unwrap()
            .with_number_of_days(15);
        assert_eq!(coupon.to_string(), "welcome - BRIEF2020 - 15 days");
    }
}
