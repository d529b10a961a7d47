//! PostgreSQL implementation of TrialCouponRepository.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;

use crate::domain::coupon::TrialCoupon;
use crate::domain::foundation::{DomainError, ErrorCode};
use crate::ports::TrialCouponRepository;

pub struct PostgresTrialCouponRepository {
    pool: PgPool,
}

impl PostgresTrialCouponRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Database row representation of a trial coupon.
#[derive(Debug, sqlx::FromRow)]
pub(super) struct TrialCouponRow {
    pub token: String,
    pub codename: String,
    pub number_of_days: i32,
    pub expires_at: Option<NaiveDate>,
    pub welcome_message: Option<String>,
    pub landing_message: Option<String>,
    pub partner_label: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<TrialCouponRow> for TrialCoupon {
    type Error = DomainError;

    fn try_from(row: TrialCouponRow) -> Result<Self, Self::Error> {
        let number_of_days = u32::try_from(row.number_of_days).map_err(|_| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Invalid number_of_days: {}", row.number_of_days),
            )
        })?;

        Ok(TrialCoupon {
            codename: row.codename,
            token: row.token,
            number_of_days,
            expires_at: row.expires_at,
            welcome_message: row.welcome_message,
            landing_message: row.landing_message,
            partner_label: row.partner_label,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl TrialCouponRepository for PostgresTrialCouponRepository {
    async fn find_by_token(&self, token: &str) -> Result<Option<TrialCoupon>, DomainError> {
        let row: Option<TrialCouponRow> = sqlx::query_as(
            r#"
            SELECT token, codename, number_of_days, expires_at, welcome_message,
                   landing_message, partner_label, created_at, updated_at
            FROM trial_coupons
            WHERE token = $1
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(ErrorCode::DatabaseError, format!("Failed to find trial coupon: {}", e))
        })?;

        row.map(TrialCoupon::try_from).transpose()
    }

    async fn save(&self, coupon: &TrialCoupon) -> Result<(), DomainError> {
        let number_of_days = i32::try_from(coupon.number_of_days).map_err(|_| {
            DomainError::validation("number_of_days", "too large")
        })?;

        sqlx::query(
            r#"
            INSERT INTO trial_coupons (
                token, codename, number_of_days, expires_at, welcome_message,
                landing_message, partner_label, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (token) DO UPDATE SET
                codename = EXCLUDED.codename,
                number_of_days = EXCLUDED.number_of_days,
                expires_at = EXCLUDED.expires_at,
                welcome_message = EXCLUDED.welcome_message,
                landing_message = EXCLUDED.landing_message,
                partner_label = EXCLUDED.partner_label,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&coupon.token)
        .bind(&coupon.codename)
        .bind(number_of_days)
        .bind(coupon.expires_at)
        .bind(&coupon.welcome_message)
        .bind(&coupon.landing_message)
        .bind(&coupon.partner_label)
        .bind(coupon.created_at)
        .bind(coupon.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(ErrorCode::DatabaseError, format!("Failed to save trial coupon: {}", e))
        })?;

        Ok(())
    }
}
