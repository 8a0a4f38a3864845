/// API routes and handlers
pub mod admin;
pub mod auth;
pub mod health;
pub mod middleware;
pub mod user;
pub mod webhook;

use crate::{auth::RoleSet, context::AppContext, error::ApiResult};
use axum::{middleware::from_fn_with_state, Router};
use serde::de::DeserializeOwned;
use validator::Validate;

/// Build API routes
pub fn routes(ctx: AppContext) -> Router<AppContext> {
    // Layers run outermost-last: authenticate, then the role check
    let signed_in = user::routes()
        .route_layer(from_fn_with_state(RoleSet::ANY_USER, middleware::require_roles))
        .route_layer(from_fn_with_state(ctx.clone(), middleware::authenticate));

    let admin_only = admin::routes()
        .route_layer(from_fn_with_state(RoleSet::ADMIN, middleware::require_roles))
        .route_layer(from_fn_with_state(ctx.clone(), middleware::authenticate));

    Router::new()
        .merge(health::routes())
        .merge(auth::routes(ctx))
        .merge(webhook::routes())
        .merge(signed_in)
        .merge(admin_only)
}

/// Parse and validate a JSON request body, reporting problems as field errors
pub(crate) fn parse_body<T>(body: &[u8]) -> ApiResult<T>
where
    T: DeserializeOwned + Validate,
{
    let value: T = serde_json::from_slice(body).map_err(|e| {
        crate::error::ApiError::invalid_field("body", format!("Invalid JSON body: {}", e))
    })?;
    value.validate()?;
    Ok(value)
}
