//! # Import Scheduler
//!
//! Periodic tick draining one page per stream for every authorized
//! connection. Ticks never overlap: the next sleep starts after the current
//! tick returns, so imports for a connection stay sequential.

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use tokio::time::{Duration, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

use crate::config::SchedulerConfig;
use crate::error::SyncError;
use crate::repositories::ConnectionRepository;
use crate::sync::SyncService;

pub struct ImportScheduler {
    config: SchedulerConfig,
    connections: Arc<ConnectionRepository>,
    sync: Arc<SyncService>,
}

impl ImportScheduler {
    pub fn new(
        config: SchedulerConfig,
        connections: Arc<ConnectionRepository>,
        sync: Arc<SyncService>,
    ) -> Self {
        Self {
            config,
            connections,
            sync,
        }
    }

    /// Runs ticks until `shutdown` fires.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(tick_seconds = self.config.tick_seconds, "starting import scheduler");
        let interval = Duration::from_secs(self.config.tick_seconds);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("import scheduler shutdown requested");
                    break;
                }
                _ = sleep(interval) => {
                    let started = Instant::now();
                    if let Err(err) = self.tick().await {
                        error!(error = %err, "import tick failed");
                    }
                    histogram!("qbo_import_tick_duration_ms")
                        .record(started.elapsed().as_secs_f64() * 1_000.0);
                }
            }
        }

        info!("import scheduler stopped");
    }

    /// One pass over every authorized connection.
    #[instrument(skip_all)]
    pub async fn tick(&self) -> Result<(), SyncError> {
        let connections = self.connections.list_authorized().await?;
        for connection in &connections {
            let outcomes = self.sync.import_all(connection).await;
            let imported: usize = outcomes.iter().map(|o| o.created + o.updated).sum();
            counter!("qbo_import_tick_connections_total").increment(1);
            info!(
                connection_id = %connection.id,
                streams = outcomes.len(),
                imported,
                "connection import pass finished"
            );
        }
        Ok(())
    }
}
