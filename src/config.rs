/// Configuration management for the ledger API
use crate::error::{ApiError, ApiResult};
use jsonwebtoken::Algorithm;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Main server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub authentication: AuthConfig,
    pub webhook: WebhookConfig,
    pub jobs: JobsConfig,
    pub bootstrap_admin: Option<BootstrapAdmin>,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    pub version: String,
}

/// Storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub database_path: PathBuf,
    pub max_connections: u32,
}

/// Session token configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub algorithm: Algorithm,
    /// Shared secret for HS* algorithms
    pub jwt_secret: Option<String>,
    /// PEM key files for asymmetric algorithms
    pub private_key_path: Option<PathBuf>,
    pub public_key_path: Option<PathBuf>,
    /// Seconds
    pub access_token_ttl: i64,
    pub refresh_token_ttl: i64,
}

impl AuthConfig {
    pub fn uses_shared_secret(&self) -> bool {
        matches!(
            self.algorithm,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
        )
    }
}

/// Webhook configuration
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub secret: String,
}

/// Background job configuration
#[derive(Debug, Clone)]
pub struct JobsConfig {
    /// Seconds between retention sweeps; 0 disables the job
    pub retention_sweep_interval: u64,
}

/// Admin account created at startup if no user has this email
#[derive(Debug, Clone)]
pub struct BootstrapAdmin {
    pub email: String,
    pub password: String,
}

/// Logging configuration; `RUST_LOG` takes precedence over `level`
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> ApiResult<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup
    pub fn from_lookup<F>(lookup: F) -> ApiResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let hostname = var("LEDGER_HOSTNAME").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = parse_or(var("LEDGER_PORT"), 8000u16, "LEDGER_PORT")?;
        let version = env!("CARGO_PKG_VERSION").to_string();

        let database_path = var("LEDGER_DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data/ledger.sqlite"));
        let max_connections = parse_or(var("LEDGER_DB_MAX_CONNECTIONS"), 10u32, "LEDGER_DB_MAX_CONNECTIONS")?;

        let algorithm = match var("LEDGER_JWT_ALGORITHM") {
            Some(name) => Algorithm::from_str(name.trim()).map_err(|_| {
                ApiError::Config(format!("Unsupported LEDGER_JWT_ALGORITHM: {}", name))
            })?,
            None => Algorithm::RS256,
        };

        let authentication = AuthConfig {
            algorithm,
            jwt_secret: var("LEDGER_JWT_SECRET"),
            private_key_path: var("LEDGER_JWT_PRIVATE_KEY_PATH").map(PathBuf::from),
            public_key_path: var("LEDGER_JWT_PUBLIC_KEY_PATH").map(PathBuf::from),
            access_token_ttl: parse_or(var("LEDGER_JWT_ACCESS_TOKEN_TTL"), 900i64, "LEDGER_JWT_ACCESS_TOKEN_TTL")?,
            refresh_token_ttl: parse_or(var("LEDGER_JWT_REFRESH_TOKEN_TTL"), 604_800i64, "LEDGER_JWT_REFRESH_TOKEN_TTL")?,
        };

        let webhook = WebhookConfig {
            secret: var("LEDGER_WEBHOOK_SECRET")
                .ok_or_else(|| ApiError::Config("LEDGER_WEBHOOK_SECRET is required".to_string()))?,
        };

        let jobs = JobsConfig {
            retention_sweep_interval: parse_or(
                var("LEDGER_RETENTION_SWEEP_INTERVAL"),
                0u64,
                "LEDGER_RETENTION_SWEEP_INTERVAL",
            )?,
        };

        let bootstrap_admin = match (
            var("LEDGER_BOOTSTRAP_ADMIN_EMAIL"),
            var("LEDGER_BOOTSTRAP_ADMIN_PASSWORD"),
        ) {
            (Some(email), Some(password)) => Some(BootstrapAdmin { email, password }),
            (None, None) => None,
            _ => {
                return Err(ApiError::Config(
                    "LEDGER_BOOTSTRAP_ADMIN_EMAIL and LEDGER_BOOTSTRAP_ADMIN_PASSWORD must be set together"
                        .to_string(),
                ))
            }
        };

        let level = var("LEDGER_LOG_LEVEL")
            .unwrap_or_else(|| "ledger_api=debug,tower_http=debug".to_string());

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                version,
            },
            storage: StorageConfig {
                database_path,
                max_connections,
            },
            authentication,
            webhook,
            jobs,
            bootstrap_admin,
            logging: LoggingConfig { level },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> ApiResult<()> {
        if self.service.hostname.is_empty() {
            return Err(ApiError::Config("Hostname cannot be empty".to_string()));
        }

        if self.storage.max_connections == 0 {
            return Err(ApiError::Config(
                "LEDGER_DB_MAX_CONNECTIONS must be at least 1".to_string(),
            ));
        }

        let auth = &self.authentication;
        if auth.access_token_ttl <= 0 || auth.refresh_token_ttl <= 0 {
            return Err(ApiError::Config("Token lifetimes must be positive".to_string()));
        }

        if auth.uses_shared_secret() {
            match &auth.jwt_secret {
                Some(secret) if secret.len() >= 32 => {}
                _ => {
                    return Err(ApiError::Config(
                        "LEDGER_JWT_SECRET must be at least 32 characters".to_string(),
                    ))
                }
            }
        } else if auth.private_key_path.is_none() || auth.public_key_path.is_none() {
            return Err(ApiError::Config(format!(
                "{:?} requires LEDGER_JWT_PRIVATE_KEY_PATH and LEDGER_JWT_PUBLIC_KEY_PATH",
                auth.algorithm
            )));
        }

        if let Some(admin) = &self.bootstrap_admin {
            if !admin.email.contains('@') {
                return Err(ApiError::Config(
                    "LEDGER_BOOTSTRAP_ADMIN_EMAIL is not an email address".to_string(),
                ));
            }
        }

        Ok(())
    }
}

fn parse_or<T: FromStr>(value: Option<String>, default: T, key: &str) -> ApiResult<T> {
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ApiError::Config(format!("Invalid value for {}: {}", key, raw))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> ApiResult<ServerConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    const HS256: &[(&str, &str)] = &[
        ("LEDGER_WEBHOOK_SECRET", "hook"),
        ("LEDGER_JWT_ALGORITHM", "HS256"),
        ("LEDGER_JWT_SECRET", "0123456789abcdef0123456789abcdef"),
    ];

    #[test]
    fn test_defaults() {
        let config = load(HS256).unwrap();
        config.validate().unwrap();
        assert_eq!(config.service.hostname, "0.0.0.0");
        assert_eq!(config.service.port, 8000);
        assert_eq!(config.storage.max_connections, 10);
        assert_eq!(config.authentication.access_token_ttl, 900);
        assert_eq!(config.authentication.refresh_token_ttl, 604_800);
        assert_eq!(config.jobs.retention_sweep_interval, 0);
        assert!(config.bootstrap_admin.is_none());
        assert_eq!(config.logging.level, "ledger_api=debug,tower_http=debug");
    }

    #[test]
    fn test_log_level_override() {
        let mut vars = HS256.to_vec();
        vars.push(("LEDGER_LOG_LEVEL", "ledger_api=warn"));
        assert_eq!(load(&vars).unwrap().logging.level, "ledger_api=warn");
    }

    #[test]
    fn test_webhook_secret_required() {
        assert!(load(&[("LEDGER_JWT_ALGORITHM", "HS256")]).is_err());
    }

    #[test]
    fn test_default_algorithm_needs_key_files() {
        let config = load(&[("LEDGER_WEBHOOK_SECRET", "hook")]).unwrap();
        assert_eq!(config.authentication.algorithm, Algorithm::RS256);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_short_hmac_secret_rejected() {
        let config = load(&[
            ("LEDGER_WEBHOOK_SECRET", "hook"),
            ("LEDGER_JWT_ALGORITHM", "HS512"),
            ("LEDGER_JWT_SECRET", "short"),
        ])
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut vars = HS256.to_vec();
        vars.push(("LEDGER_PORT", "eighty"));
        assert!(load(&vars).is_err());

        let mut vars = HS256.to_vec();
        vars.push(("LEDGER_JWT_ALGORITHM", "none"));
        assert!(load(&vars).is_err());
    }

    #[test]
    fn test_bootstrap_admin_pairing() {
        let mut vars = HS256.to_vec();
        vars.push(("LEDGER_BOOTSTRAP_ADMIN_EMAIL", "root@example.com"));
        assert!(load(&vars).is_err());

        vars.push(("LEDGER_BOOTSTRAP_ADMIN_PASSWORD", "hunter22"));
        let config = load(&vars).unwrap();
        assert_eq!(config.bootstrap_admin.unwrap().email, "root@example.com");
    }
}
