/// Ledger API server
///
/// Issues session tokens and applies signed transaction webhooks to
/// account balances.
use ledger_api::{jobs::JobScheduler, metrics, server, ApiResult, AppContext, ServerConfig};
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ApiResult<()> {
    // Load configuration first so its log level can seed the filter
    let config = ServerConfig::from_env()?;

    // Initialize logging; RUST_LOG wins over LEDGER_LOG_LEVEL
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        version = %config.service.version,
        algorithm = ?config.authentication.algorithm,
        database = %config.storage.database_path.display(),
        "Starting ledger API"
    );

    // Create application context
    let ctx = Arc::new(AppContext::new(config).await?);

    // Start background jobs
    let scheduler = Arc::new(JobScheduler::new(Arc::clone(&ctx)));
    let _jobs = scheduler.start();

    let started = Instant::now();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(std::time::Duration::from_secs(15));
        loop {
            tick.tick().await;
            metrics::UPTIME_SECONDS.set(started.elapsed().as_secs_f64());
        }
    });

    // Start server
    server::serve((*ctx).clone()).await?;

    Ok(())
}
