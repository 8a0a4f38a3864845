/// Unified error types for the ledger API
use crate::{auth::TokenKind, metrics};
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

/// Reasons an authentication attempt is rejected (all surface as 401)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthFailure {
    #[error("Missing or invalid Authorization header")]
    MissingToken,

    #[error("Token expired")]
    ExpiredToken,

    #[error("Token revoked")]
    RevokedToken,

    #[error("Invalid token type. {} token required.", .0.title())]
    WrongTokenKind(TokenKind),

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid refresh token")]
    InvalidRefreshToken,
}

/// A single field-level validation problem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Main error type for the API
#[derive(Error, Debug)]
pub enum ApiError {
    /// Malformed or missing input
    #[error("Validation error: {}", format_fields(.0))]
    Validation(Vec<FieldError>),

    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(AuthFailure),

    /// Role or capability mismatch
    #[error("Not authorized: {0}")]
    Authorization(String),

    /// Webhook digest did not match
    #[error("Invalid signature")]
    SignatureInvalid,

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Transaction id already applied
    #[error("Duplicate transaction: {0}")]
    DuplicateTransaction(String),

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration errors
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

fn format_fields(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(|f| format!("{}: {}", f.field, f.message))
        .collect::<Vec<_>>()
        .join(", ")
}

impl ApiError {
    /// Shorthand for a validation error on one field
    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::Validation(vec![FieldError::new(field, message)])
    }

    /// Label used for the `errors_total` metric
    fn kind(&self) -> &'static str {
        match self {
            ApiError::Database(_) => "database",
            ApiError::Migration(_) => "migration",
            ApiError::Config(_) => "config",
            ApiError::Io(_) => "io",
            _ => "internal",
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<FieldError> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                let field = field.to_string();
                errs.iter().map(move |e| {
                    let message = e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string());
                    FieldError::new(field.clone(), message)
                })
            })
            .collect();
        fields.sort_by(|a, b| a.field.cmp(&b.field));
        ApiError::Validation(fields)
    }
}

/// Convert ApiError to HTTP response
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::Validation(fields) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "Validation Error", "details": fields }),
            ),
            ApiError::Authentication(AuthFailure::ExpiredToken) => (
                StatusCode::UNAUTHORIZED,
                json!({ "error": "Token expired", "code": "token-expired" }),
            ),
            ApiError::Authentication(failure) => (
                StatusCode::UNAUTHORIZED,
                json!({ "error": failure.to_string() }),
            ),
            ApiError::Authorization(message) => {
                (StatusCode::FORBIDDEN, json!({ "error": message }))
            }
            ApiError::SignatureInvalid => (
                StatusCode::FORBIDDEN,
                json!({ "error": "Invalid signature" }),
            ),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, json!({ "error": message })),
            ApiError::DuplicateTransaction(_) => (
                StatusCode::CONFLICT,
                json!({ "error": "Duplicate transaction" }),
            ),
            ApiError::Database(_)
            | ApiError::Migration(_)
            | ApiError::Config(_)
            | ApiError::Io(_)
            | ApiError::Internal(_) => {
                let error_id = Uuid::new_v4().to_string();
                tracing::error!(error_id = %error_id, error = %self, "Unhandled error");
                metrics::record_error(self.kind(), "api");

                // Don't leak details
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({
                        "error": "Internal Server Error",
                        "message": "An unexpected error occurred. Please try again later.",
                        "error_id": error_id,
                    }),
                )
            }
        };

        json_response(status, &body)
    }
}

/// Serialize a JSON body, falling back to the critical-failure body if encoding fails
pub fn json_response(status: StatusCode, body: &serde_json::Value) -> Response {
    match serde_json::to_vec(body) {
        Ok(bytes) => (
            status,
            [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
            bytes,
        )
            .into_response(),
        Err(e) => {
            let error_id = Uuid::new_v4().to_string();
            tracing::error!(
                error_id = %error_id,
                error = %e,
                "CRITICAL: failed to encode error response"
            );
            metrics::record_error("encode", "error_handler");
            critical_failure_response(&error_id)
        }
    }
}

/// Response for a failure raised while another failure was being handled
pub fn critical_failure_response(error_id: &str) -> Response {
    let body = format!(
        r#"{{"error":"Critical System Failure","error_id":"{}","message":"An error occurred while processing another error"}}"#,
        error_id
    );
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
        body,
    )
        .into_response()
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_domain_errors_map_to_status() {
        let cases = vec![
            (ApiError::invalid_field("email", "required"), StatusCode::BAD_REQUEST),
            (
                ApiError::Authentication(AuthFailure::InvalidCredentials),
                StatusCode::UNAUTHORIZED,
            ),
            (
                ApiError::Authorization("Insufficient permissions".to_string()),
                StatusCode::FORBIDDEN,
            ),
            (ApiError::SignatureInvalid, StatusCode::FORBIDDEN),
            (ApiError::NotFound("User not found".to_string()), StatusCode::NOT_FOUND),
            (
                ApiError::DuplicateTransaction("t1".to_string()),
                StatusCode::CONFLICT,
            ),
        ];

        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }

    #[tokio::test]
    async fn test_expired_token_carries_code() {
        let response = ApiError::Authentication(AuthFailure::ExpiredToken).into_response();
        let body = body_json(response).await;
        assert_eq!(body["code"], "token-expired");
    }

    #[tokio::test]
    async fn test_internal_error_is_opaque_with_correlation_id() {
        let response =
            ApiError::Internal("secret connection string leaked".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        assert_eq!(body["error"], "Internal Server Error");
        let error_id = body["error_id"].as_str().unwrap();
        assert!(Uuid::parse_str(error_id).is_ok());
        assert!(!body.to_string().contains("secret"));
    }

    #[tokio::test]
    async fn test_validation_body_lists_fields() {
        let response = ApiError::Validation(vec![
            FieldError::new("email", "Email is required"),
            FieldError::new("password", "Password is required"),
        ])
        .into_response();
        let body = body_json(response).await;
        assert_eq!(body["details"].as_array().unwrap().len(), 2);
        assert_eq!(body["details"][0]["field"], "email");
    }

    #[tokio::test]
    async fn test_critical_failure_body_is_valid_json() {
        let body = body_json(critical_failure_response("abc")).await;
        assert_eq!(body["error"], "Critical System Failure");
        assert_eq!(body["error_id"], "abc");
    }
}
