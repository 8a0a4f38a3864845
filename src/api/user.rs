/// Read-only endpoints for the signed-in user
use crate::{
    auth::Principal,
    context::AppContext,
    db::{
        accounts,
        models::{format_amount, Account, Transaction},
        transactions, users,
    },
    error::{ApiError, ApiResult},
};
use axum::{extract::State, response::Json, routing::get, Router};
use serde::Serialize;

/// Build user routes; callers attach the authentication layers
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/data", get(get_data))
        .route("/user/accounts", get(user_accounts))
        .route("/user/transactions", get(user_transactions))
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub email: String,
    pub full_name: Option<String>,
    pub role: String,
}

#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub id: i64,
    pub balance: String,
}

impl From<Account> for AccountResponse {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            balance: format_amount(account.balance),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    pub id: String,
    pub account_id: i64,
    pub amount: String,
}

impl From<Transaction> for TransactionResponse {
    fn from(transaction: Transaction) -> Self {
        Self {
            id: transaction.id,
            account_id: transaction.account_id,
            amount: format_amount(transaction.amount),
        }
    }
}

/// GET /data
async fn get_data(
    State(ctx): State<AppContext>,
    principal: Principal,
) -> ApiResult<Json<UserResponse>> {
    let mut conn = ctx.db.acquire().await?;
    let user = users::find_by_id(&mut conn, principal.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    Ok(Json(UserResponse {
        id: user.id,
        email: user.email,
        full_name: user.full_name,
        role: user.role.to_string(),
    }))
}

/// GET /user/accounts
async fn user_accounts(
    State(ctx): State<AppContext>,
    principal: Principal,
) -> ApiResult<Json<Vec<AccountResponse>>> {
    let mut conn = ctx.db.acquire().await?;
    let accounts = accounts::list_for_user(&mut conn, principal.user_id).await?;
    Ok(Json(accounts.into_iter().map(AccountResponse::from).collect()))
}

/// GET /user/transactions
async fn user_transactions(
    State(ctx): State<AppContext>,
    principal: Principal,
) -> ApiResult<Json<Vec<TransactionResponse>>> {
    let mut conn = ctx.db.acquire().await?;
    let transactions = transactions::list_for_user(&mut conn, principal.user_id).await?;
    Ok(Json(
        transactions
            .into_iter()
            .map(TransactionResponse::from)
            .collect(),
    ))
}
