//! In-memory trial coupon repository.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::coupon::TrialCoupon;
use crate::domain::foundation::DomainError;
use crate::ports::TrialCouponRepository;

#[derive(Debug, Clone, Default)]
pub struct InMemoryTrialCouponRepository {
    coupons: Arc<RwLock<HashMap<String, TrialCoupon>>>,
}

impl InMemoryTrialCouponRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TrialCouponRepository for InMemoryTrialCouponRepository {
    async fn find_by_token(&self, token: &str) -> Result<Option<TrialCoupon>, DomainError> {
        Ok(self.coupons.read().await.get(token).cloned())
    }

    async fn save(&self, coupon: &TrialCoupon) -> Result<(), DomainError> {
        self.coupons
            .write()
            .await
            .insert(coupon.token.clone(), coupon.clone());
        Ok(())
    }
}
