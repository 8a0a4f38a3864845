/// Session token issuance and verification
use super::{revocation::RevocationStore, TokenKind};
use crate::{
    clock::Clock,
    config::AuthConfig,
    db::models::{from_unix, is_expired, Role},
    error::{ApiError, ApiResult, AuthFailure},
};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Token verification failures
#[derive(Error, Debug)]
pub enum TokenError {
    #[error("Token expired")]
    Expired,

    #[error("Invalid token: {0}")]
    Invalid(String),

    #[error("Token revoked")]
    Revoked,

    /// A failed revocation lookup; never treated as "not revoked"
    #[error("Revocation lookup failed: {0}")]
    Storage(#[from] sqlx::Error),
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => ApiError::Authentication(AuthFailure::ExpiredToken),
            TokenError::Invalid(reason) => ApiError::Authentication(AuthFailure::InvalidToken(reason)),
            TokenError::Revoked => ApiError::Authentication(AuthFailure::RevokedToken),
            TokenError::Storage(e) => ApiError::Database(e),
        }
    }
}

/// Identity a token is issued for
#[derive(Debug, Clone)]
pub struct SubjectClaims {
    pub user_id: i64,
    pub full_name: Option<String>,
    pub email: String,
    pub role: Role,
}

/// Session token claim set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub full_name: Option<String>,
    pub email: String,
    pub role: Role,
    #[serde(rename = "type")]
    pub kind: TokenKind,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

impl Claims {
    pub fn user_id(&self) -> Result<i64, TokenError> {
        self.sub
            .parse()
            .map_err(|_| TokenError::Invalid("Subject is not a user id".to_string()))
    }

    pub fn expires_at(&self) -> Result<DateTime<Utc>, TokenError> {
        from_unix(self.exp).map_err(|_| TokenError::Invalid("Expiry out of range".to_string()))
    }
}

/// An encoded token with the claims it carries
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: Claims,
}

/// Access and refresh tokens issued together
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: IssuedToken,
    pub refresh: IssuedToken,
}

/// Key material for one signing algorithm
#[derive(Clone)]
pub struct SigningKeys {
    algorithm: Algorithm,
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKeys {
    /// Shared-secret HMAC keys (HS256/HS384/HS512)
    pub fn hmac(algorithm: Algorithm, secret: &[u8]) -> ApiResult<Self> {
        match algorithm {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => Ok(Self {
                algorithm,
                encoding: EncodingKey::from_secret(secret),
                decoding: DecodingKey::from_secret(secret),
            }),
            other => Err(ApiError::Config(format!(
                "{:?} is not an HMAC algorithm",
                other
            ))),
        }
    }

    /// Asymmetric keys from a PEM private key and PEM public key
    pub fn from_pem(algorithm: Algorithm, private_pem: &[u8], public_pem: &[u8]) -> ApiResult<Self> {
        let key_error = |e: jsonwebtoken::errors::Error| {
            ApiError::Config(format!("Invalid {:?} key material: {}", algorithm, e))
        };

        let (encoding, decoding) = match algorithm {
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512 => (
                EncodingKey::from_rsa_pem(private_pem).map_err(key_error)?,
                DecodingKey::from_rsa_pem(public_pem).map_err(key_error)?,
            ),
            Algorithm::ES256 | Algorithm::ES384 => (
                EncodingKey::from_ec_pem(private_pem).map_err(key_error)?,
                DecodingKey::from_ec_pem(public_pem).map_err(key_error)?,
            ),
            Algorithm::EdDSA => (
                EncodingKey::from_ed_pem(private_pem).map_err(key_error)?,
                DecodingKey::from_ed_pem(public_pem).map_err(key_error)?,
            ),
            other => {
                return Err(ApiError::Config(format!(
                    "{:?} does not use PEM key material",
                    other
                )))
            }
        };

        Ok(Self {
            algorithm,
            encoding,
            decoding,
        })
    }

    /// Load key material once at startup
    pub fn from_config(config: &AuthConfig) -> ApiResult<Self> {
        if config.uses_shared_secret() {
            let secret = config
                .jwt_secret
                .as_ref()
                .ok_or_else(|| ApiError::Config("LEDGER_JWT_SECRET is required".to_string()))?;
            return Self::hmac(config.algorithm, secret.as_bytes());
        }

        let read = |path: &Option<std::path::PathBuf>, name: &str| -> ApiResult<Vec<u8>> {
            let path = path
                .as_ref()
                .ok_or_else(|| ApiError::Config(format!("{} is required", name)))?;
            std::fs::read(path).map_err(|e| {
                ApiError::Config(format!("Cannot read {} ({}): {}", name, path.display(), e))
            })
        };

        let private_pem = read(&config.private_key_path, "LEDGER_JWT_PRIVATE_KEY_PATH")?;
        let public_pem = read(&config.public_key_path, "LEDGER_JWT_PUBLIC_KEY_PATH")?;
        Self::from_pem(config.algorithm, &private_pem, &public_pem)
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }
}

/// Issues and verifies signed session tokens
#[derive(Clone)]
pub struct TokenService {
    keys: SigningKeys,
    access_ttl: Duration,
    refresh_ttl: Duration,
    revocations: RevocationStore,
    clock: Arc<dyn Clock>,
}

impl TokenService {
    pub fn new(
        keys: SigningKeys,
        access_ttl: Duration,
        refresh_ttl: Duration,
        revocations: RevocationStore,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            keys,
            access_ttl,
            refresh_ttl,
            revocations,
            clock,
        }
    }

    /// Configured lifetime for a token kind
    pub fn ttl(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        }
    }

    /// Sign a fresh token; no side effects
    pub fn issue(
        &self,
        subject: &SubjectClaims,
        kind: TokenKind,
        ttl: Duration,
    ) -> ApiResult<IssuedToken> {
        let now = self.clock.now();
        let claims = Claims {
            sub: subject.user_id.to_string(),
            full_name: subject.full_name.clone(),
            email: subject.email.clone(),
            role: subject.role,
            kind,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        // Header::new sets typ = "JWT"
        let token = encode(&Header::new(self.keys.algorithm), &claims, &self.keys.encoding)
            .map_err(|e| ApiError::Internal(format!("Token signing failed: {}", e)))?;

        Ok(IssuedToken { token, claims })
    }

    /// Access and refresh tokens with their configured lifetimes
    pub fn issue_pair(&self, subject: &SubjectClaims) -> ApiResult<TokenPair> {
        Ok(TokenPair {
            access: self.issue(subject, TokenKind::Access, self.access_ttl)?,
            refresh: self.issue(subject, TokenKind::Refresh, self.refresh_ttl)?,
        })
    }

    /// Check signature, structure and expiry without touching storage
    pub fn decode(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(self.keys.algorithm);
        // Expiry is judged against the injected clock below
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let data = decode::<Claims>(token, &self.keys.decoding, &validation).map_err(|e| {
            use jsonwebtoken::errors::ErrorKind;
            match e.kind() {
                ErrorKind::InvalidSignature => TokenError::Invalid("Invalid token signature".to_string()),
                ErrorKind::Json(_) => TokenError::Invalid(format!("Malformed claims: {}", e)),
                _ => TokenError::Invalid(e.to_string()),
            }
        })?;

        let claims = data.claims;
        if claims.jti.is_empty() {
            return Err(TokenError::Invalid("Missing token ID".to_string()));
        }
        if is_expired(claims.expires_at()?, self.clock.now()) {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }

    /// Fail with `Revoked` if the token's jti has been revoked
    pub async fn ensure_not_revoked(
        &self,
        conn: &mut SqliteConnection,
        claims: &Claims,
    ) -> Result<(), TokenError> {
        if self.revocations.is_revoked(conn, &claims.jti).await? {
            return Err(TokenError::Revoked);
        }
        Ok(())
    }

    /// Full verification, reading revocation state through the caller's connection
    pub async fn verify(
        &self,
        conn: &mut SqliteConnection,
        token: &str,
    ) -> Result<Claims, TokenError> {
        let claims = self.decode(token)?;
        self.ensure_not_revoked(conn, &claims).await?;
        Ok(claims)
    }
}
