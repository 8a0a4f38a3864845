use crate::{context::AppContext, metrics};
use std::sync::Arc;
use std::time::Instant;
use tokio::{
    task::JoinHandle,
    time::{interval, Duration, MissedTickBehavior},
};
use tracing::{error, info};

pub mod tasks;

/// Job scheduler for background tasks
pub struct JobScheduler {
    context: Arc<AppContext>,
}

impl JobScheduler {
    pub fn new(context: Arc<AppContext>) -> Self {
        Self { context }
    }

    /// Start all enabled background jobs
    pub fn start(self: Arc<Self>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        let sweep = self.context.config.jobs.retention_sweep_interval;
        if sweep > 0 {
            info!(interval_secs = sweep, "Starting retention sweep job");
            handles.push(tokio::spawn(Self::retention_sweep_job(
                Arc::clone(&self),
                Duration::from_secs(sweep),
            )));
        } else {
            info!("Retention sweep disabled");
        }

        handles
    }

    /// Purge expired revocation and refresh-token rows
    async fn retention_sweep_job(scheduler: Arc<Self>, period: Duration) {
        let mut interval = interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            let start = Instant::now();

            match tasks::purge_expired_tokens(&scheduler.context).await {
                Ok(report) => {
                    metrics::record_background_job(
                        "retention_sweep",
                        "success",
                        start.elapsed().as_secs_f64(),
                    );
                    if report.total() > 0 {
                        info!(
                            revoked = report.revoked_tokens,
                            refresh = report.refresh_tokens,
                            "Purged expired token records"
                        );
                    }
                }
                Err(e) => {
                    metrics::record_background_job(
                        "retention_sweep",
                        "failure",
                        start.elapsed().as_secs_f64(),
                    );
                    error!("Failed to purge expired tokens: {}", e);
                }
            }
        }
    }
}
