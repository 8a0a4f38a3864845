/// Session endpoints: login, refresh and logout
use super::{middleware, parse_body};
use crate::{
    auth::{Claims, Principal, SubjectClaims, TokenKind, TokenPair},
    context::AppContext,
    db::{models::User, users},
    error::{ApiError, ApiResult, AuthFailure},
    metrics,
};
use axum::{
    body::Bytes, extract::State, middleware::from_fn_with_state, response::Json, routing::post,
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use validator::Validate;

/// Build auth routes
pub fn routes(ctx: AppContext) -> Router<AppContext> {
    let logout = Router::new()
        .route("/auth/logout", post(logout))
        .route_layer(from_fn_with_state(ctx, middleware::authenticate));

    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .merge(logout)
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(
        required(message = "Email is required"),
        length(min = 1, message = "Email is required")
    )]
    pub email: Option<String>,

    #[validate(
        required(message = "Password is required"),
        length(min = 1, message = "Password is required")
    )]
    pub password: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RefreshRequest {
    #[validate(
        required(message = "Refresh token is required"),
        length(min = 1, message = "Refresh token is required")
    )]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

impl TokenResponse {
    fn new(pair: TokenPair, expires_in: i64) -> Self {
        Self {
            access_token: pair.access.token,
            refresh_token: pair.refresh.token,
            token_type: "bearer".to_string(),
            expires_in,
        }
    }
}

fn subject_of(user: &User) -> SubjectClaims {
    SubjectClaims {
        user_id: user.id,
        full_name: user.full_name.clone(),
        email: user.email.clone(),
        role: user.role,
    }
}

/// POST /auth/login
async fn login(State(ctx): State<AppContext>, body: Bytes) -> ApiResult<Json<TokenResponse>> {
    let request: LoginRequest = parse_body(&body)?;
    let email = request.email.unwrap_or_default();
    let password = request.password.unwrap_or_default();

    // Password check happens before any write, outside the unit of work.
    // Unknown emails still pay for one Argon2 verify.
    let user = {
        let mut conn = ctx.db.acquire().await?;
        users::find_by_email(&mut conn, &email).await?
    };
    let verified = match &user {
        Some(user) => {
            ctx.hasher
                .verify_blocking(password, user.password_hash.clone())
                .await?
        }
        None => ctx.hasher.verify_decoy_blocking(password).await?,
    };
    let user = match user {
        Some(user) if verified => user,
        _ => {
            tracing::warn!(email = %email, "login failed");
            metrics::record_auth_event("login", false);
            return Err(ApiError::Authentication(AuthFailure::InvalidCredentials));
        }
    };

    let pair = ctx.tokens.issue_pair(&subject_of(&user))?;
    let token_hash = ctx.refresh_tokens.hash(&pair.refresh.token).await?;

    let mut tx = ctx.db.begin().await?;
    ctx.refresh_tokens
        .replace(&mut tx, user.id, &token_hash, ctx.tokens.ttl(TokenKind::Refresh))
        .await?;
    tx.commit().await?;

    tracing::info!(user_id = user.id, "login succeeded");
    metrics::record_auth_event("login", true);

    let expires_in = ctx.tokens.ttl(TokenKind::Access).num_seconds();
    Ok(Json(TokenResponse::new(pair, expires_in)))
}

/// POST /auth/refresh
async fn refresh(State(ctx): State<AppContext>, body: Bytes) -> ApiResult<Json<TokenResponse>> {
    let result = refresh_inner(&ctx, &body).await;
    if !matches!(result, Err(ApiError::Validation(_))) {
        metrics::record_auth_event("refresh", result.is_ok());
    }
    result
}

async fn refresh_inner(ctx: &AppContext, body: &[u8]) -> ApiResult<Json<TokenResponse>> {
    let request: RefreshRequest = parse_body(body)?;
    let presented = request.refresh_token.unwrap_or_default();

    let pending = prepare_refresh(ctx, &presented).await?;
    let user_id = pending.user_id;
    let pair = complete_refresh(ctx, pending).await?;

    tracing::info!(user_id, "refresh token rotated");

    let expires_in = ctx.tokens.ttl(TokenKind::Access).num_seconds();
    Ok(Json(TokenResponse::new(pair, expires_in)))
}

/// A refresh whose Argon2 work is done and which only needs to be committed
struct PendingRefresh {
    user_id: i64,
    claims: Claims,
    verified_hash: String,
    pair: TokenPair,
    new_hash: String,
}

/// Everything slow, without holding the write lock
async fn prepare_refresh(ctx: &AppContext, presented: &str) -> ApiResult<PendingRefresh> {
    let claims = ctx.tokens.decode(presented).map_err(|e| {
        tracing::warn!(error = %e, "refresh token rejected");
        ApiError::from(e)
    })?;
    if claims.kind != TokenKind::Refresh {
        return Err(ApiError::Authentication(AuthFailure::WrongTokenKind(
            TokenKind::Refresh,
        )));
    }
    let user_id = claims.user_id()?;

    let (user, record) = {
        let mut conn = ctx.db.acquire().await?;
        ctx.tokens.ensure_not_revoked(&mut conn, &claims).await?;
        let user = users::find_by_id(&mut conn, user_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
        (user, ctx.refresh_tokens.current(&mut conn, user_id).await?)
    };

    let verified = match &record {
        Some(record) => ctx.refresh_tokens.verify_record(record, presented).await?,
        None => false,
    };
    let Some(record) = record.filter(|_| verified) else {
        tracing::warn!(user_id, jti = %claims.jti, "superseded or unknown refresh token");
        return Err(ApiError::Authentication(AuthFailure::InvalidRefreshToken));
    };

    let pair = ctx.tokens.issue_pair(&subject_of(&user))?;
    let new_hash = ctx.refresh_tokens.hash(&pair.refresh.token).await?;

    Ok(PendingRefresh {
        user_id,
        claims,
        verified_hash: record.token_hash,
        pair,
        new_hash,
    })
}

/// Swap the verified record for the new one, if nothing rotated it meanwhile
async fn complete_refresh(ctx: &AppContext, pending: PendingRefresh) -> ApiResult<TokenPair> {
    let user_id = pending.user_id;

    let mut tx = ctx.db.begin().await?;
    // Concurrent refreshes for this user queue here until commit
    ctx.refresh_tokens.lock(&mut tx, user_id).await?;
    ctx.tokens.ensure_not_revoked(&mut tx, &pending.claims).await?;

    if !ctx
        .refresh_tokens
        .is_current(&mut tx, user_id, &pending.verified_hash)
        .await?
    {
        tracing::warn!(user_id, jti = %pending.claims.jti, "refresh token rotated concurrently");
        return Err(ApiError::Authentication(AuthFailure::InvalidRefreshToken));
    }

    ctx.refresh_tokens
        .replace(&mut tx, user_id, &pending.new_hash, ctx.tokens.ttl(TokenKind::Refresh))
        .await?;
    tx.commit().await?;

    Ok(pending.pair)
}

/// POST /auth/logout
async fn logout(
    State(ctx): State<AppContext>,
    principal: Principal,
) -> ApiResult<Json<serde_json::Value>> {
    let mut tx = ctx.db.begin().await?;

    let newly_revoked = ctx
        .revocations
        .revoke(
            &mut tx,
            &principal.jti,
            principal.user_id,
            principal.kind,
            principal.expires_at,
        )
        .await?;
    if !newly_revoked {
        // Lost a race with another logout using the same token
        return Err(ApiError::Authentication(AuthFailure::RevokedToken));
    }

    ctx.refresh_tokens.invalidate(&mut tx, principal.user_id).await?;
    tx.commit().await?;

    tracing::info!(user_id = principal.user_id, jti = %principal.jti, "logged out");
    metrics::record_auth_event("logout", true);

    Ok(Json(json!({ "message": "Successfully logged out" })))
}
