use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::persist::RoundRobinStore;
use crate::slices::SliceStore;
use crate::writer::Writer;

/// Outcome of one harvest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RollupSummary {
    pub windows: usize,
    pub series: usize,
    pub failures: usize,
}

/// Periodically harvests closed windows and hands every series to each
/// writer.
///
/// Sole caller of `SliceStore::extract_closed`. Writers run sequentially on
/// the scheduler task; a failing rollup is logged and the rest continue.
pub struct RollupScheduler<S> {
    store: Arc<SliceStore>,
    writers: Vec<Writer>,
    backend: S,
    interval: Duration,
}

impl<S: RoundRobinStore> RollupScheduler<S> {
    pub fn new(store: Arc<SliceStore>, writers: Vec<Writer>, backend: S, interval: Duration) -> Self {
        Self {
            store,
            writers,
            backend,
            interval,
        }
    }

    /// Rolls up every closed window, plus the open one if `include_open`.
    pub async fn harvest(&self, include_open: bool) -> RollupSummary {
        let windows = self.store.extract_closed(include_open);
        let mut summary = RollupSummary {
            windows: windows.len(),
            ..Default::default()
        };

        for window in &windows {
            summary.series += window.series();

            for (key, samples) in &window.sets {
                for writer in &self.writers {
                    if let Err(e) = writer
                        .rollup(&self.backend, window.start_time, key, samples)
                        .await
                    {
                        summary.failures += 1;
                        error!(
                            writer = writer.name(),
                            key = %key,
                            window = window.start_time,
                            error = %e,
                            "rollup failed",
                        );
                    }
                }
            }
        }

        summary
    }

    /// Runs the harvest loop until cancelled, then rolls up everything left,
    /// open window included.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let summary = self.harvest(false).await;
                    if summary.windows > 0 {
                        debug!(
                            windows = summary.windows,
                            series = summary.series,
                            failures = summary.failures,
                            "rolled up closed slices",
                        );
                    }
                }
            }
        }

        let summary = self.harvest(true).await;
        info!(
            windows = summary.windows,
            series = summary.series,
            failures = summary.failures,
            "final rollup complete",
        );
    }
}
