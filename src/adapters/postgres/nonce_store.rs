//! PostgreSQL implementation of NonceStore.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::direct::Nonce;
use crate::domain::foundation::{DomainError, ErrorCode};
use crate::ports::NonceStore;

pub struct PostgresNonceStore {
    pool: PgPool,
}

impl PostgresNonceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Removes nonces created before `cutoff`, returning the count.
    pub async fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<u64, DomainError> {
        let result = sqlx::query("DELETE FROM nonces WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(|e| database_error("purge", e))?;
        Ok(result.rows_affected())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct NonceRow {
    service: String,
    value: String,
    timestamp: String,
    created_at: DateTime<Utc>,
}

impl From<NonceRow> for Nonce {
    fn from(row: NonceRow) -> Self {
        Nonce {
            service: row.service,
            value: row.value,
            timestamp: row.timestamp,
            created_at: row.created_at,
        }
    }
}

fn database_error(action: &str, e: sqlx::Error) -> DomainError {
    DomainError::new(
        ErrorCode::DatabaseError,
        format!("Failed to {} nonce: {}", action, e),
    )
}

#[async_trait]
impl NonceStore for PostgresNonceStore {
    async fn save(&self, nonce: &Nonce) -> Result<(), DomainError> {
        sqlx::query(
            "INSERT INTO nonces (service, value, timestamp, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(&nonce.service)
        .bind(&nonce.value)
        .bind(&nonce.timestamp)
        .bind(nonce.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| database_error("save", e))?;
        Ok(())
    }

    async fn find(
        &self,
        service: &str,
        value: &str,
        timestamp: &str,
    ) -> Result<Vec<Nonce>, DomainError> {
        let rows: Vec<NonceRow> = sqlx::query_as(
            r#"
            SELECT service, value, timestamp, created_at
            FROM nonces
            WHERE service = $1 AND value = $2 AND timestamp = $3
            "#,
        )
        .bind(service)
        .bind(value)
        .bind(timestamp)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| database_error("find", e))?;

        Ok(rows.into_iter().map(Nonce::from).collect())
    }

    async fn delete(&self, nonce: &Nonce) -> Result<bool, DomainError> {
        let result = sqlx::query(
            "DELETE FROM nonces WHERE service = $1 AND value = $2 AND timestamp = $3",
        )
            .bind(&nonce.service)
            .bind(&nonce.value)
            .bind(&nonce.timestamp)
            .execute(&self.pool)
            .await
            .map_err(|e| database_error("delete", e))?;
        Ok(result.rows_affected() > 0)
    }
}
