/// Typed webhook payload, parsed after the signature has been checked
use super::signature::{WebhookFields, SIGNATURE_FIELD};
use crate::{
    db::models::{fits_amount_column, to_fixed},
    error::{ApiError, ApiResult, FieldError},
};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use std::str::FromStr;
use validator::Validate;

#[derive(Debug, Clone, PartialEq, Eq, Validate)]
pub struct WebhookPayload {
    #[validate(length(min = 1, max = 64, message = "Transaction id must be 1-64 characters"))]
    pub transaction_id: String,

    #[validate(range(min = 1, message = "User id must be a positive integer"))]
    pub user_id: i64,

    #[validate(range(min = 1, message = "Account id must be a positive integer"))]
    pub account_id: i64,

    /// Signed amount, quantized to 2 decimal places
    pub amount: Decimal,

    pub signature: String,
}

impl WebhookPayload {
    /// Build from raw fields, reporting every problem field at once
    pub fn from_fields(fields: &WebhookFields) -> ApiResult<Self> {
        let mut errors = Vec::new();

        let transaction_id = required::<String>(fields, "transaction_id", "a string", &mut errors);
        let user_id = required::<i64>(fields, "user_id", "an integer", &mut errors);
        let account_id = required::<i64>(fields, "account_id", "an integer", &mut errors);
        let signature = required::<String>(fields, SIGNATURE_FIELD, "a string", &mut errors);
        let amount = match fields.get("amount") {
            Some(raw) => match parse_amount(raw.get()) {
                Some(amount) if fits_amount_column(amount) => Some(amount),
                Some(_) => {
                    errors.push(FieldError::new(
                        "amount",
                        "Amount must be less than 100000000 in magnitude",
                    ));
                    None
                }
                None => {
                    errors.push(FieldError::new("amount", "Amount must be a decimal number"));
                    None
                }
            },
            None => {
                errors.push(FieldError::new("amount", "Field is required"));
                None
            }
        };

        let (
            Some(transaction_id),
            Some(user_id),
            Some(account_id),
            Some(amount),
            Some(signature),
        ) = (transaction_id, user_id, account_id, amount, signature)
        else {
            errors.sort_by(|a, b| a.field.cmp(&b.field));
            return Err(ApiError::Validation(errors));
        };

        let payload = Self {
            transaction_id,
            user_id,
            account_id,
            amount,
            signature,
        };
        payload.validate()?;
        Ok(payload)
    }
}

fn required<T: DeserializeOwned>(
    fields: &WebhookFields,
    name: &str,
    expected: &str,
    errors: &mut Vec<FieldError>,
) -> Option<T> {
    let Some(raw) = fields.get(name) else {
        errors.push(FieldError::new(name, "Field is required"));
        return None;
    };

    match serde_json::from_str(raw.get()) {
        Ok(value) => Some(value),
        Err(_) => {
            errors.push(FieldError::new(name, format!("Field must be {}", expected)));
            None
        }
    }
}

/// Accept `"12.34"` or `12.34`, rounding half away from zero to cents
fn parse_amount(raw: &str) -> Option<Decimal> {
    let text = match serde_json::from_str::<serde_json::Value>(raw).ok()? {
        serde_json::Value::String(s) => s.trim().to_string(),
        serde_json::Value::Number(_) => raw.trim().to_string(),
        _ => return None,
    };

    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
        .map(to_fixed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webhook::signature::parse_fields;

    fn parse(body: &str) -> ApiResult<WebhookPayload> {
        WebhookPayload::from_fields(&parse_fields(body.as_bytes()).unwrap())
    }

    fn field_names(err: ApiError) -> Vec<String> {
        match err {
            ApiError::Validation(fields) => fields.into_iter().map(|f| f.field).collect(),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_valid_payload() {
        let payload = parse(
            r#"{"transaction_id": "t1", "user_id": 1, "account_id": 2, "amount": "100.00", "signature": "abc"}"#,
        )
        .unwrap();
        assert_eq!(payload.transaction_id, "t1");
        assert_eq!(payload.account_id, 2);
        assert_eq!(payload.amount.to_string(), "100.00");
    }

    #[test]
    fn test_amount_forms() {
        assert_eq!(parse_amount("100").unwrap().to_string(), "100.00");
        assert_eq!(parse_amount("\"-10\"").unwrap().to_string(), "-10.00");
        assert_eq!(parse_amount("1.005").unwrap().to_string(), "1.01");
        assert_eq!(parse_amount("1e2").unwrap().to_string(), "100.00");
        assert!(parse_amount("\"ten\"").is_none());
        assert!(parse_amount("true").is_none());
        assert!(parse_amount("null").is_none());
    }

    #[test]
    fn test_oversized_amount_rejected() {
        let body = |amount: &str| {
            format!(
                r#"{{"transaction_id": "t1", "user_id": 1, "account_id": 2, "amount": {}, "signature": "abc"}}"#,
                amount
            )
        };

        let largest = parse(&body(r#""99999999.99""#)).unwrap();
        assert_eq!(largest.amount.to_string(), "99999999.99");

        for amount in [
            r#""100000000""#,
            r#""-100000000.00""#,
            r#""99999999.995""#,
            r#""50000000000000000000000000000""#,
            "1e30",
        ] {
            assert_eq!(field_names(parse(&body(amount)).unwrap_err()), vec!["amount"], "{}", amount);
        }
    }

    #[test]
    fn test_missing_and_mistyped_fields_reported() {
        let err = parse(r#"{"user_id": "one", "amount": "x", "signature": "abc"}"#).unwrap_err();
        assert_eq!(
            field_names(err),
            vec!["account_id", "amount", "transaction_id", "user_id"]
        );
    }

    #[test]
    fn test_range_and_length_rules() {
        let long_id = "x".repeat(65);
        let body = format!(
            r#"{{"transaction_id": "{}", "user_id": 0, "account_id": 2, "amount": "1.00", "signature": "abc"}}"#,
            long_id
        );
        assert_eq!(field_names(parse(&body).unwrap_err()), vec!["transaction_id", "user_id"]);

        let err = parse(
            r#"{"transaction_id": "", "user_id": 1, "account_id": 2, "amount": "1.00", "signature": "abc"}"#,
        )
        .unwrap_err();
        assert_eq!(field_names(err), vec!["transaction_id"]);
    }
}
