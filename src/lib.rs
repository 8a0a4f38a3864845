/// Ledger API
///
/// Session-token authentication and signed transaction webhook ingestion
/// for a small financial-account service.

pub mod api;
pub mod auth;
pub mod clock;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod jobs;
pub mod metrics;
pub mod server;
pub mod webhook;

pub use config::ServerConfig;
pub use context::AppContext;
pub use error::{ApiError, ApiResult};
