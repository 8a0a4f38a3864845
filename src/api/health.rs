/// Health and metrics endpoints
use crate::{context::AppContext, db, metrics};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Health status response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    /// "ok" or "degraded"
    pub status: String,

    /// Application version
    pub version: String,

    /// Store round-trip in milliseconds
    pub database_ms: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Build health and metrics routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_text))
}

/// GET /health
///
/// 200 when the store answers a trivial query, 503 otherwise.
pub async fn health(State(ctx): State<AppContext>) -> (StatusCode, Json<HealthStatus>) {
    let start = Instant::now();
    let check = db::test_connection(&ctx.db).await;
    let database_ms = start.elapsed().as_millis() as u64;

    match check {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthStatus {
                status: "ok".to_string(),
                version: ctx.config.service.version.clone(),
                database_ms,
                error: None,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check failed: database unreachable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthStatus {
                    status: "degraded".to_string(),
                    version: ctx.config.service.version.clone(),
                    database_ms,
                    error: Some("database unreachable".to_string()),
                }),
            )
        }
    }
}

/// GET /metrics
pub async fn metrics_text() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render_metrics(),
    )
}
