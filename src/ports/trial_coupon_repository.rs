//! Trial coupon repository port.

use async_trait::async_trait;

use crate::domain::coupon::TrialCoupon;
use crate::domain::foundation::DomainError;

#[async_trait]
pub trait TrialCouponRepository: Send + Sync {
    async fn find_by_token(&self, token: &str) -> Result<Option<TrialCoupon>, DomainError>;

    /// Inserts or replaces the coupon with the same token.
    async fn save(&self, coupon: &TrialCoupon) -> Result<(), DomainError>;
}
