//! Single-use nonces protecting Chargify Direct round trips.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Service name under which Chargify Direct nonces are stored.
pub const CHARGIFY_NONCE_SERVICE: &str = "chargify";

/// Default lifetime of an issued nonce.
pub const DEFAULT_NONCE_TTL_SECS: i64 = 3600;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nonce {
    pub service: String,
    pub value: String,
    /// Unix seconds, kept as the exact string that was signed.
    pub timestamp: String,
    pub created_at: DateTime<Utc>,
}

impl Nonce {
    /// Issues a fresh nonce for `service`.
    pub fn issue(service: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            service: service.into(),
            value: Uuid::new_v4().simple().to_string(),
            timestamp: now.timestamp().to_string(),
            created_at: now,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.created_at > ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().unwrap()
    }

    #[test]
    fn issue_uses_unix_timestamp() {
        let nonce = Nonce::issue(CHARGIFY_NONCE_SERVICE, at(1_300_000_000));
        assert_eq!(nonce.service, "chargify");
        assert_eq!(nonce.timestamp, "1300000000");
        assert_eq!(nonce.value.len(), 32);
    }

    #[test]
    fn issued_values_are_unique() {
        let a = Nonce::issue(CHARGIFY_NONCE_SERVICE, at(0));
        let b = Nonce::issue(CHARGIFY_NONCE_SERVICE, at(0));
        assert_ne!(a.value, b.value);
    }

    #[test]
    fn expires_after_ttl() {
        let nonce = Nonce::issue(CHARGIFY_NONCE_SERVICE, at(1_000));
        let ttl = Duration::seconds(DEFAULT_NONCE_TTL_SECS);
        assert!(!nonce.is_expired(at(1_000 + 3600), ttl));
        assert!(nonce.is_expired(at(1_000 + 3601), ttl));
    }
}
