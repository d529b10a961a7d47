//! Trial coupons.

mod trial_coupon;

pub use trial_coupon::{TrialCoupon, DEFAULT_TRIAL_DAYS};
