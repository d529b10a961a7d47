//! Converters applied to raw Chargify snapshot values.
//!
//! Chargify's REST API returns typed JSON while webhook payloads carry every
//! scalar as a string, so each converter accepts both shapes. None of them
//! fail: unusable input maps to `None` (or zero for prices).

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;

/// Reads an integer from a JSON number or a numeric string.
pub fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Parses an ISO-8601 timestamp.
///
/// Accepts RFC 3339, Chargify's legacy `YYYY-MM-DD HH:MM:SS -ZZZZ`, naive
/// timestamps (taken as UTC) and bare dates (midnight UTC).
pub fn parse_datetime(value: &Value) -> Option<DateTime<FixedOffset>> {
    let raw = value.as_str()?.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt);
    }
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S %z") {
        return Some(dt);
    }

    let utc = FixedOffset::east_opt(0)?;
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return naive.and_local_timezone(utc).single();
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0)?.and_local_timezone(utc).single();
    }

    None
}

/// Last calendar day of a card's expiration month.
pub fn expiration_last_day(credit_card: &Value) -> Option<NaiveDate> {
    let year = i32::try_from(as_integer(credit_card.get("expiration_year")?)?).ok()?;
    let month = u32::try_from(as_integer(credit_card.get("expiration_month")?)?).ok()?;

    let (next_year, next_month) = if month == 12 {
        (year.checked_add(1)?, 1)
    } else {
        (year, month.checked_add(1)?)
    };

    // Validates the month as a side effect.
    NaiveDate::from_ymd_opt(year, month, 1)?;
    NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()
}

/// Converts an amount in cents to a decimal amount. Unusable input is zero.
pub fn convert_price(value: Option<&Value>) -> Decimal {
    let cents = match value {
        Some(Value::Number(n)) => match n.as_i64() {
            Some(i) => Some(Decimal::from(i)),
            None => n.as_f64().and_then(Decimal::from_f64_retain),
        },
        Some(Value::String(s)) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    };

    cents
        .map(|c| c / Decimal::new(100, 0))
        .unwrap_or(Decimal::ZERO)
}

/// Lowercased text value.
pub fn lower(value: &Value) -> Option<String> {
    value.as_str().map(str::to_lowercase)
}
