/// Persisted entities as plain values
use crate::error::{ApiError, ApiResult};
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// User role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> ApiResult<Self> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            _ => Err(ApiError::invalid_field("role", format!("Invalid role: {}", s))),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User record
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub full_name: Option<String>,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
}

/// Fields for a user insert
#[derive(Debug, Clone)]
pub struct NewUser {
    pub full_name: Option<String>,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

/// Account record; `balance` is only mutated by transaction ingestion
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Account {
    pub id: i64,
    pub user_id: i64,
    pub balance: Decimal,
}

/// Ledger entry; `id` is caller supplied and doubles as the idempotency key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transaction {
    pub id: String,
    pub user_id: i64,
    pub account_id: i64,
    pub amount: Decimal,
    pub signature: String,
}

/// Hashed refresh token; at most one row per user
#[derive(Debug, Clone)]
pub struct RefreshTokenRecord {
    pub user_id: i64,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}

impl RefreshTokenRecord {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        is_active(self.expires_at, now)
    }
}

/// A record is live strictly before its expiry instant
pub fn is_active(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    expires_at > now
}

pub fn is_expired(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    !is_active(expires_at, now)
}

/// Convert a stored unix timestamp
pub fn from_unix(seconds: i64) -> ApiResult<DateTime<Utc>> {
    DateTime::from_timestamp(seconds, 0)
        .ok_or_else(|| ApiError::Internal(format!("Invalid timestamp: {}", seconds)))
}

/// Amounts and balances are NUMERIC(10,2): magnitude strictly below 10^8
pub fn fits_amount_column(value: Decimal) -> bool {
    value.abs() < Decimal::new(100_000_000, 0)
}

/// Quantize to 2 decimal places, rounding half away from zero
pub fn to_fixed(value: Decimal) -> Decimal {
    let mut fixed = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    fixed.rescale(2);
    fixed
}

/// Canonical 2-decimal text, e.g. "100.00"
pub fn format_amount(value: Decimal) -> String {
    to_fixed(value).to_string()
}

/// Parse a stored amount column
pub fn parse_stored_amount(text: &str) -> ApiResult<Decimal> {
    Decimal::from_str(text)
        .map(to_fixed)
        .map_err(|e| ApiError::Internal(format!("Corrupt amount {:?}: {}", text, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_role_parse() {
        assert_eq!(Role::parse("admin").unwrap(), Role::Admin);
        assert_eq!(Role::parse("USER").unwrap(), Role::User);
        assert!(Role::parse("root").is_err());
    }

    #[test]
    fn test_expiry_is_pure_function_of_now() {
        let now = Utc::now();
        assert!(is_active(now + Duration::seconds(1), now));
        assert!(!is_active(now, now));
        assert!(is_expired(now - Duration::seconds(1), now));
    }

    #[test]
    fn test_to_fixed_rounds_half_up() {
        assert_eq!(format_amount(Decimal::from_str("100").unwrap()), "100.00");
        assert_eq!(format_amount(Decimal::from_str("1.005").unwrap()), "1.01");
        assert_eq!(format_amount(Decimal::from_str("-1.005").unwrap()), "-1.01");
        assert_eq!(format_amount(Decimal::from_str("2.5").unwrap()), "2.50");
    }

    #[test]
    fn test_amount_column_bound() {
        assert!(fits_amount_column(Decimal::from_str("99999999.99").unwrap()));
        assert!(fits_amount_column(Decimal::from_str("-99999999.99").unwrap()));
        assert!(!fits_amount_column(Decimal::from_str("100000000.00").unwrap()));
        assert!(!fits_amount_column(Decimal::from_str("-100000000").unwrap()));
    }

    #[test]
    fn test_parse_stored_amount() {
        assert_eq!(parse_stored_amount("20.00").unwrap().to_string(), "20.00");
        assert!(parse_stored_amount("twenty").is_err());
    }
}
