/// Transaction webhook endpoint
use crate::{context::AppContext, db::models::format_amount, error::ApiResult};
use axum::{body::Bytes, extract::State, response::Json, routing::post, Router};
use serde_json::json;

/// Build webhook routes
pub fn routes() -> Router<AppContext> {
    Router::new().route("/webhook/transaction", post(transaction_webhook))
}

/// POST /webhook/transaction
///
/// The raw body is handed over untouched; the signature covers the exact
/// text of each field as sent.
async fn transaction_webhook(
    State(ctx): State<AppContext>,
    body: Bytes,
) -> ApiResult<Json<serde_json::Value>> {
    let outcome = ctx.ingestion.ingest(&body).await?;
    Ok(Json(json!({
        "status": "success",
        "balance": format_amount(outcome.balance),
    })))
}
