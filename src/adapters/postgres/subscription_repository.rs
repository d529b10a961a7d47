//! PostgreSQL implementation of SubscriptionRepository.
//!
//! The cached Chargify snapshot is stored as JSONB; the trial coupon is
//! referenced by token and loaded with a LEFT JOIN.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use sqlx::PgPool;

use crate::domain::coupon::TrialCoupon;
use crate::domain::foundation::{DomainError, ErrorCode, SubscriptionId, UserId};
use crate::domain::subscription::{SubscriptionRecord, SubscriptionSnapshot};
use crate::ports::SubscriptionRepository;

use super::trial_coupon_repository::TrialCouponRow;

pub struct PostgresSubscriptionRepository {
    pool: PgPool,
}

impl PostgresSubscriptionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const SELECT_RECORD: &str = r#"
    SELECT s.id, s.user_id, s.snapshot, s.hold_start_date, s.hold_end_date,
           s.created_at, s.updated_at,
           c.token AS coupon_token, c.codename AS coupon_codename,
           c.number_of_days AS coupon_number_of_days, c.expires_at AS coupon_expires_at,
           c.welcome_message AS coupon_welcome_message,
           c.landing_message AS coupon_landing_message,
           c.partner_label AS coupon_partner_label,
           c.created_at AS coupon_created_at, c.updated_at AS coupon_updated_at
    FROM subscriptions s
    LEFT JOIN trial_coupons c ON c.token = s.trial_coupon_token
"#;

/// Database row of a subscription joined with its trial coupon.
#[derive(Debug, sqlx::FromRow)]
struct SubscriptionRow {
    id: i64,
    user_id: String,
    snapshot: Value,
    hold_start_date: Option<NaiveDate>,
    hold_end_date: Option<NaiveDate>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    coupon_token: Option<String>,
    coupon_codename: Option<String>,
    coupon_number_of_days: Option<i32>,
    coupon_expires_at: Option<NaiveDate>,
    coupon_welcome_message: Option<String>,
    coupon_landing_message: Option<String>,
    coupon_partner_label: Option<String>,
    coupon_created_at: Option<DateTime<Utc>>,
    coupon_updated_at: Option<DateTime<Utc>>,
}

impl SubscriptionRow {
    fn trial_coupon(&mut self) -> Result<Option<TrialCoupon>, DomainError> {
        let (Some(token), Some(codename)) = (self.coupon_token.take(), self.coupon_codename.take())
        else {
            return Ok(None);
        };
        let row = TrialCouponRow {
            token,
            codename,
            number_of_days: self.coupon_number_of_days.unwrap_or_default(),
            expires_at: self.coupon_expires_at,
            welcome_message: self.coupon_welcome_message.take(),
            landing_message: self.coupon_landing_message.take(),
            partner_label: self.coupon_partner_label.take().unwrap_or_default(),
            created_at: self.coupon_created_at.unwrap_or(self.created_at),
            updated_at: self.coupon_updated_at.unwrap_or(self.updated_at),
        };
        TrialCoupon::try_from(row).map(Some)
    }
}

impl TryFrom<SubscriptionRow> for SubscriptionRecord {
    type Error = DomainError;

    fn try_from(mut row: SubscriptionRow) -> Result<Self, Self::Error> {
        let trial_coupon = row.trial_coupon()?;
        Ok(SubscriptionRecord {
            id: SubscriptionId::new(row.id),
            user_id: UserId::new(row.user_id).map_err(|e| {
                DomainError::new(ErrorCode::DatabaseError, format!("Invalid user_id: {}", e))
            })?,
            snapshot: SubscriptionSnapshot::new(row.snapshot),
            hold_start_date: row.hold_start_date,
            hold_end_date: row.hold_end_date,
            trial_coupon,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn database_error(action: &str, e: sqlx::Error) -> DomainError {
    DomainError::new(
        ErrorCode::DatabaseError,
        format!("Failed to {} subscription: {}", action, e),
    )
}

#[async_trait]
impl SubscriptionRepository for PostgresSubscriptionRepository {
    async fn save(&self, record: &SubscriptionRecord) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions (
                id, user_id, snapshot, hold_start_date, hold_end_date,
                trial_coupon_token, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(record.id.as_i64())
        .bind(record.user_id.as_str())
        .bind(record.snapshot.to_value())
        .bind(record.hold_start_date)
        .bind(record.hold_end_date)
        .bind(record.trial_coupon.as_ref().map(|c| c.token.as_str()))
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.constraint() == Some("subscriptions_pkey") {
                    return DomainError::new(
                        ErrorCode::SubscriptionExists,
                        format!("Subscription {} already exists", record.id),
                    );
                }
            }
            database_error("save", e)
        })?;

        Ok(())
    }

    async fn update(&self, record: &SubscriptionRecord) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE subscriptions SET
                user_id = $2,
                snapshot = $3,
                hold_start_date = $4,
                hold_end_date = $5,
                trial_coupon_token = $6,
                updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(record.id.as_i64())
        .bind(record.user_id.as_str())
        .bind(record.snapshot.to_value())
        .bind(record.hold_start_date)
        .bind(record.hold_end_date)
        .bind(record.trial_coupon.as_ref().map(|c| c.token.as_str()))
        .bind(record.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| database_error("update", e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::new(
                ErrorCode::SubscriptionNotFound,
                format!("Subscription {} not found", record.id),
            ));
        }

        Ok(())
    }

    async fn find_by_id(
        &self,
        id: SubscriptionId,
    ) -> Result<Option<SubscriptionRecord>, DomainError> {
        let row: Option<SubscriptionRow> =
            sqlx::query_as(&format!("{} WHERE s.id = $1", SELECT_RECORD))
                .bind(id.as_i64())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| database_error("find", e))?;

        row.map(SubscriptionRecord::try_from).transpose()
    }

    async fn find_by_user_id(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<SubscriptionRecord>, DomainError> {
        let rows: Vec<SubscriptionRow> = sqlx::query_as(&format!(
            "{} WHERE s.user_id = $1 ORDER BY s.created_at DESC, s.id DESC",
            SELECT_RECORD
        ))
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| database_error("find", e))?;

        rows.into_iter().map(SubscriptionRecord::try_from).collect()
    }

    async fn delete(&self, id: SubscriptionId) -> Result<(), DomainError> {
        sqlx::query("DELETE FROM subscriptions WHERE id = $1")
            .bind(id.as_i64())
            .execute(&self.pool)
            .await
            .map_err(|e| database_error("delete", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row() -> SubscriptionRow {
        let now = Utc::now();
        SubscriptionRow {
            id: 15,
            user_id: "42".into(),
            snapshot: json!({ "id": 15, "state": "trialing" }),
            hold_start_date: None,
            hold_end_date: None,
            created_at: now,
            updated_at: now,
            coupon_token: None,
            coupon_codename: None,
            coupon_number_of_days: None,
            coupon_expires_at: None,
            coupon_welcome_message: None,
            coupon_landing_message: None,
            coupon_partner_label: None,
            coupon_created_at: None,
            coupon_updated_at: None,
        }
    }

    #[test]
    fn row_without_coupon_converts() {
        let record = SubscriptionRecord::try_from(row()).unwrap();
        assert_eq!(record.id, SubscriptionId::new(15));
        assert!(record.is_trialing());
        assert!(record.trial_coupon.is_none());
    }

    #[test]
    fn row_with_coupon_converts() {
        let mut row = row();
        row.coupon_token = Some("spring".into());
        row.coupon_codename = Some("spring-campaign".into());
        row.coupon_number_of_days = Some(14);

        let record = SubscriptionRecord::try_from(row).unwrap();
        let coupon = record.trial_coupon.unwrap();
        assert_eq!(coupon.token, "spring");
        assert_eq!(coupon.number_of_days, 14);
    }

    #[test]
    fn row_with_blank_user_is_rejected() {
        let mut row = row();
        row.user_id = " ".into();
        let err = SubscriptionRecord::try_from(row).unwrap_err();
        assert_eq!(err.code, ErrorCode::DatabaseError);
    }
}
