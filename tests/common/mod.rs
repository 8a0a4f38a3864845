//! Shared harness for router-level tests
#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use ledger_api::{
    auth::Argon2Params,
    clock::ManualClock,
    db::{
        models::{NewUser, Role, User},
        users,
    },
    server::build_router,
    AppContext, ServerConfig,
};
use serde_json::{json, Value};
use std::{collections::HashMap, sync::Arc};
use tempfile::TempDir;
use tower::ServiceExt;

pub const JWT_SECRET: &str = "test-secret-test-secret-test-secret";
pub const WEBHOOK_SECRET: &str = "webhook-test-secret";
pub const PASSWORD: &str = "correct horse battery staple";

pub struct TestApp {
    pub ctx: AppContext,
    pub router: Router,
    pub clock: Arc<ManualClock>,
    _dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_vars(&[]).await
    }

    /// HS256 app over a fresh database; `extra` overrides defaults
    pub async fn with_vars(extra: &[(&str, &str)]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("ledger.sqlite");

        let mut vars: HashMap<String, String> = [
            ("LEDGER_DATABASE_PATH", db_path.to_str().unwrap()),
            ("LEDGER_JWT_ALGORITHM", "HS256"),
            ("LEDGER_JWT_SECRET", JWT_SECRET),
            ("LEDGER_WEBHOOK_SECRET", WEBHOOK_SECRET),
            ("LEDGER_JWT_ACCESS_TOKEN_TTL", "900"),
            ("LEDGER_JWT_REFRESH_TOKEN_TTL", "3600"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        for (k, v) in extra {
            vars.insert(k.to_string(), v.to_string());
        }

        let config = ServerConfig::from_lookup(|key| vars.get(key).cloned()).unwrap();
        let clock = Arc::new(ManualClock::starting_now());
        let ctx = AppContext::with_options(config, clock.clone(), Argon2Params::insecure_fast())
            .await
            .unwrap();
        let router = build_router(ctx.clone());

        Self {
            ctx,
            router,
            clock,
            _dir: dir,
        }
    }

    pub async fn create_user(&self, email: &str, role: Role) -> User {
        let password_hash = self.ctx.hasher.hash(PASSWORD).unwrap();
        let mut conn = self.ctx.db.acquire().await.unwrap();
        users::create(
            &mut conn,
            NewUser {
                full_name: Some("Test User".to_string()),
                email: email.to_string(),
                password_hash,
                role,
            },
        )
        .await
        .unwrap()
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, body)
    }

    pub async fn post_json(&self, uri: &str, body: &Value, bearer: Option<&str>) -> (StatusCode, Value) {
        self.post_raw(uri, serde_json::to_vec(body).unwrap(), bearer).await
    }

    pub async fn post_raw(&self, uri: &str, body: Vec<u8>, bearer: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        self.send(builder.body(Body::from(body)).unwrap()).await
    }

    pub async fn get(&self, uri: &str, bearer: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(token) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    /// Log in and return (access_token, refresh_token)
    pub async fn login(&self, email: &str) -> (String, String) {
        let (status, body) = self
            .post_json("/auth/login", &json!({"email": email, "password": PASSWORD}), None)
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        (
            body["access_token"].as_str().unwrap().to_string(),
            body["refresh_token"].as_str().unwrap().to_string(),
        )
    }

    /// Sign a webhook payload with the configured secret
    pub fn signed_webhook(&self, payload: Value) -> Value {
        let mut payload = payload;
        let signature = self.ctx.ingestion.verifier().sign_value(&payload).unwrap();
        payload["signature"] = json!(signature);
        payload
    }

    pub async fn refresh_rows(&self, user_id: i64) -> i64 {
        let mut conn = self.ctx.db.acquire().await.unwrap();
        self.ctx
            .refresh_tokens
            .count_for_user(&mut conn, user_id)
            .await
            .unwrap()
    }
}
