/// Authentication, authorization and request metrics middleware
use crate::{
    auth::{Principal, RoleSet, TokenKind},
    context::AppContext,
    error::{ApiError, AuthFailure},
    metrics,
};
use axum::{
    extract::{MatchedPath, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use std::time::Instant;

/// Extract bearer token from Authorization header
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

/// Verify the bearer access token and add the principal to extensions
pub async fn authenticate(
    State(ctx): State<AppContext>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer_token(req.headers())
        .ok_or(ApiError::Authentication(AuthFailure::MissingToken))?;

    let claims = {
        let mut conn = ctx.db.acquire().await?;
        ctx.tokens.verify(&mut conn, &token).await.map_err(|e| {
            tracing::warn!(error = %e, "access token rejected");
            ApiError::from(e)
        })?
    };

    if claims.kind != TokenKind::Access {
        tracing::warn!(jti = %claims.jti, kind = %claims.kind, "non-access token presented");
        return Err(ApiError::Authentication(AuthFailure::WrongTokenKind(
            TokenKind::Access,
        )));
    }

    let principal = Principal::try_from(claims)?;
    req.extensions_mut().insert(principal);

    Ok(next.run(req).await)
}

/// Reject principals whose role is outside the route's role set
pub async fn require_roles(
    State(roles): State<RoleSet>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let principal = req
        .extensions()
        .get::<Principal>()
        .ok_or(ApiError::Authentication(AuthFailure::MissingToken))?;

    if !roles.allows(principal.role) {
        tracing::warn!(user_id = principal.user_id, role = %principal.role, "role not permitted");
        return Err(ApiError::Authorization("Insufficient permissions".to_string()));
    }

    Ok(next.run(req).await)
}

/// Count and time every request by its route template
pub async fn track_metrics(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    metrics::HTTP_REQUESTS_ACTIVE.inc();
    let response = next.run(req).await;
    metrics::HTTP_REQUESTS_ACTIVE.dec();

    metrics::record_http_request(
        &method,
        &path,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );
    response
}
