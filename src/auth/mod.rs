/// Session authentication core
///
/// Issues and verifies signed session tokens, keeps the single live refresh
/// token per user, and tracks revoked token identifiers.

pub mod password;
pub mod refresh;
pub mod revocation;
pub mod tokens;

pub use password::{Argon2Params, SecretHasher};
pub use refresh::RefreshTokenStore;
pub use revocation::RevocationStore;
pub use tokens::{Claims, IssuedToken, SigningKeys, SubjectClaims, TokenError, TokenPair, TokenService};

use crate::{
    db::models::Role,
    error::{ApiError, AuthFailure},
};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Session token kind, carried in the `type` claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            TokenKind::Access => "Access",
            TokenKind::Refresh => "Refresh",
        }
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authenticated caller, placed in request extensions by the auth middleware
#[derive(Debug, Clone, Serialize)]
pub struct Principal {
    pub user_id: i64,
    pub email: String,
    pub full_name: Option<String>,
    pub role: Role,
    #[serde(skip)]
    pub jti: String,
    #[serde(skip)]
    pub kind: TokenKind,
    #[serde(skip)]
    pub expires_at: DateTime<Utc>,
}

impl TryFrom<Claims> for Principal {
    type Error = TokenError;

    fn try_from(claims: Claims) -> Result<Self, Self::Error> {
        let user_id = claims.user_id()?;
        let expires_at = claims.expires_at()?;
        Ok(Principal {
            user_id,
            email: claims.email,
            full_name: claims.full_name,
            role: claims.role,
            jti: claims.jti,
            kind: claims.kind,
            expires_at,
        })
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .ok_or(ApiError::Authentication(AuthFailure::MissingToken))
    }
}

/// Roles allowed through a gated route
#[derive(Debug, Clone, Copy)]
pub struct RoleSet(pub &'static [Role]);

impl RoleSet {
    pub const ANY_USER: RoleSet = RoleSet(&[Role::User, Role::Admin]);
    pub const ADMIN: RoleSet = RoleSet(&[Role::Admin]);

    pub fn allows(&self, role: Role) -> bool {
        self.0.contains(&role)
    }
}
