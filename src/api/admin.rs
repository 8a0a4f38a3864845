/// Admin listing endpoints
use super::user::AccountResponse;
use crate::{
    context::AppContext,
    db::users,
    error::ApiResult,
};
use axum::{extract::State, response::Json, routing::get, Router};
use serde::Serialize;

/// Build admin routes; callers attach the authentication and role layers
pub fn routes() -> Router<AppContext> {
    Router::new().route("/admin/users-accounts", get(users_accounts))
}

#[derive(Debug, Serialize)]
pub struct UserWithAccountsResponse {
    pub id: i64,
    pub full_name: Option<String>,
    pub email: String,
    pub role: String,
    pub accounts: Vec<AccountResponse>,
}

/// GET /admin/users-accounts
async fn users_accounts(
    State(ctx): State<AppContext>,
) -> ApiResult<Json<Vec<UserWithAccountsResponse>>> {
    let mut conn = ctx.db.acquire().await?;
    let listing = users::list_with_accounts(&mut conn).await?;

    Ok(Json(
        listing
            .into_iter()
            .map(|(user, accounts)| UserWithAccountsResponse {
                id: user.id,
                full_name: user.full_name,
                email: user.email,
                role: user.role.to_string(),
                accounts: accounts.into_iter().map(AccountResponse::from).collect(),
            })
            .collect(),
    ))
}
