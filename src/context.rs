/// Application context and dependency injection
use crate::{
    auth::{Argon2Params, RefreshTokenStore, RevocationStore, SecretHasher, SigningKeys, TokenService},
    clock::{Clock, SystemClock},
    config::{BootstrapAdmin, ServerConfig},
    db::{
        self,
        models::{NewUser, Role},
        users,
    },
    error::ApiResult,
    webhook::{SignatureVerifier, TransactionIngestion},
};
use chrono::Duration;
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    pub clock: Arc<dyn Clock>,
    pub hasher: SecretHasher,
    pub tokens: TokenService,
    pub refresh_tokens: RefreshTokenStore,
    pub revocations: RevocationStore,
    pub ingestion: TransactionIngestion,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> ApiResult<Self> {
        Self::with_options(config, Arc::new(SystemClock), Argon2Params::default()).await
    }

    /// Create a context with an explicit clock and hashing cost
    pub async fn with_options(
        config: ServerConfig,
        clock: Arc<dyn Clock>,
        argon2: Argon2Params,
    ) -> ApiResult<Self> {
        // Validate configuration
        config.validate()?;

        // Key files are read here, once
        let keys = SigningKeys::from_config(&config.authentication)?;

        let options = db::DatabaseOptions {
            max_connections: config.storage.max_connections,
            ..Default::default()
        };
        let pool = db::create_pool(&config.storage.database_path, options).await?;
        db::run_migrations(&pool).await?;
        db::test_connection(&pool).await?;

        let hasher = SecretHasher::new(argon2)?;
        let revocations = RevocationStore::new(clock.clone());
        let refresh_tokens = RefreshTokenStore::new(hasher.clone(), clock.clone());
        let tokens = TokenService::new(
            keys,
            Duration::seconds(config.authentication.access_token_ttl),
            Duration::seconds(config.authentication.refresh_token_ttl),
            revocations.clone(),
            clock.clone(),
        );
        let ingestion = TransactionIngestion::new(
            pool.clone(),
            SignatureVerifier::new(config.webhook.secret.clone()),
        );

        let ctx = Self {
            config: Arc::new(config),
            db: pool,
            clock,
            hasher,
            tokens,
            refresh_tokens,
            revocations,
            ingestion,
        };

        if let Some(admin) = ctx.config.bootstrap_admin.clone() {
            ctx.ensure_admin(&admin).await?;
        }

        Ok(ctx)
    }

    /// Create the bootstrap admin unless a user with that email already exists
    async fn ensure_admin(&self, admin: &BootstrapAdmin) -> ApiResult<()> {
        let mut conn = self.db.acquire().await?;
        if users::find_by_email(&mut conn, &admin.email).await?.is_some() {
            return Ok(());
        }

        let password_hash = self.hasher.hash_blocking(admin.password.clone()).await?;
        let user = users::create(
            &mut conn,
            NewUser {
                full_name: None,
                email: admin.email.clone(),
                password_hash,
                role: Role::Admin,
            },
        )
        .await?;

        tracing::info!(user_id = user.id, email = %user.email, "Bootstrap admin created");
        Ok(())
    }

    /// Get service URL
    pub fn service_url(&self) -> String {
        format!(
            "http://{}:{}",
            self.config.service.hostname, self.config.service.port
        )
    }
}
