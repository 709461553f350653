//! Background staging sweeper.
//!
//! Runs [`UpdateStager::sweep`] on a fixed interval until cancelled.
//!
//! # Example
//!
//! ```ignore
//! use packsync::staging::StagingSweeper;
//!
//! let shutdown = CancellationToken::new();
//! let handle = StagingSweeper::new(Arc::clone(&stager), config.sweep_interval)
//!     .spawn(shutdown.clone());
//!
//! // ... later
//! shutdown.cancel();
//! let totals = handle.await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::stager::{SweepReport, UpdateStager};

/// Periodic reclaimer of expired staged updates.
#[derive(Debug, Clone)]
pub struct StagingSweeper {
    stager: Arc<UpdateStager>,
    interval: Duration,
}

impl StagingSweeper {
    /// Create a sweeper. A zero interval is raised to one second.
    pub fn new(stager: Arc<UpdateStager>, interval: Duration) -> Self {
        Self {
            stager,
            interval: interval.max(Duration::from_secs(1)),
        }
    }

    /// Sweep once per tick until `shutdown` fires. The first sweep runs
    /// immediately. Returns the accumulated report.
    pub async fn run(self, shutdown: CancellationToken) -> SweepReport {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut totals = SweepReport::default();

        info!(interval_secs = self.interval.as_secs(), "Staging sweeper started");

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Staging sweeper shutting down");
                    break;
                }

                _ = ticker.tick() => {
                    match self.stager.sweep().await {
                        Ok(report) => {
                            debug!(reclaimed = report.reclaimed(), "Sweep tick");
                            totals.merge(report);
                        }
                        Err(e) => warn!(error = %e, "Staging sweep failed"),
                    }
                }
            }
        }

        info!(
            expired = totals.expired,
            orphans = totals.orphans,
            failed = totals.failed,
            "Staging sweeper stopped"
        );
        totals
    }

    /// Run on the current tokio runtime.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<SweepReport> {
        tokio::spawn(self.run(shutdown))
    }
}
