pub mod rrdtool;

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::ingest::sample::CompositeKey;

pub use self::rrdtool::RrdTool;

/// File extension of round-robin database files.
pub const FILE_EXTENSION: &str = "rrd";

/// Seconds without an update before a data point is considered unknown.
const HEARTBEAT_SECS: u64 = 600;

/// Errors reported by a round-robin store backend.
#[derive(Error, Debug)]
pub enum PersistError {
    #[error("spawning {}: {source}", tool.display())]
    Spawn {
        tool: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} {} exited with {status}", file.display())]
    Failed {
        command: &'static str,
        file: PathBuf,
        status: std::process::ExitStatus,
    },
}

/// Consolidation function applied when folding steps into an archive row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consolidation {
    Average,
    Min,
    Max,
}

impl Consolidation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Average => "AVERAGE",
            Self::Min => "MIN",
            Self::Max => "MAX",
        }
    }
}

/// Archive resolution: one row per `resolution_secs`, kept for `span_secs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retention {
    pub resolution_secs: u64,
    pub span_secs: u64,
}

/// Retained history: full resolution for 72 hours, 10-minute rows for a
/// month, 8-hour rows for five years.
pub const RETENTIONS: [Retention; 3] = [
    Retention {
        resolution_secs: 0,
        span_secs: 72 * 3600,
    },
    Retention {
        resolution_secs: 10 * 60,
        span_secs: 30 * 24 * 3600,
    },
    Retention {
        resolution_secs: 8 * 3600,
        span_secs: 5 * 365 * 24 * 3600,
    },
];

impl Retention {
    /// Steps folded into one row and row count for a given database step.
    /// A resolution of zero means one row per step.
    pub fn rows_for_step(&self, step: u64) -> (u64, u64) {
        let step = step.max(1);
        let steps_per_row = (self.resolution_secs / step).max(1);
        let rows = self.span_secs.div_ceil(steps_per_row * step);
        (steps_per_row, rows)
    }
}

/// Layout of one database file: its gauges and tracked consolidations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RrdSchema {
    pub data_sources: &'static [&'static str],
    pub consolidations: &'static [Consolidation],
}

impl RrdSchema {
    /// Data source and archive definitions for `rrdtool create`.
    pub fn definitions(&self, step: u64) -> Vec<String> {
        let heartbeat = HEARTBEAT_SECS.max(step.saturating_mul(2));
        let mut defs =
            Vec::with_capacity(self.data_sources.len() + self.consolidations.len() * RETENTIONS.len());

        for name in self.data_sources {
            // No bounds: negative samples yield negative quartiles.
            defs.push(format!("DS:{name}:GAUGE:{heartbeat}:U:U"));
        }

        for cf in self.consolidations {
            for retention in &RETENTIONS {
                let (steps_per_row, rows) = retention.rows_for_step(step);
                defs.push(format!("RRA:{}:0.5:{steps_per_row}:{rows}", cf.as_str()));
            }
        }

        defs
    }
}

/// Round-robin time-series storage backend.
pub trait RoundRobinStore: Send + Sync {
    /// Directory holding the database files.
    fn data_dir(&self) -> &Path;

    /// Whether a database file already exists.
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    /// Create a database whose first accepted update is after `start`.
    fn create(
        &self,
        path: &Path,
        start: i64,
        schema: &RrdSchema,
    ) -> impl std::future::Future<Output = Result<(), PersistError>> + Send;

    /// Append one data point at `time`.
    fn update(
        &self,
        path: &Path,
        time: i64,
        values: &[i64],
    ) -> impl std::future::Future<Output = Result<(), PersistError>> + Send;
}

/// Database file name for a statistic of one series.
pub fn file_name(statistic: &str, key: &CompositeKey) -> String {
    format!("{statistic}-{}.{FILE_EXTENSION}", key.file_stem())
}

/// Writes one data point, creating the database first if needed.
///
/// The database is created to start one second before `time`, since
/// rrdtool rejects updates at or before a file's start. A failed create
/// skips the update.
pub async fn write_point<S: RoundRobinStore>(
    store: &S,
    statistic: &str,
    schema: &RrdSchema,
    key: &CompositeKey,
    time: i64,
    values: &[i64],
) -> Result<(), PersistError> {
    let path = store.data_dir().join(file_name(statistic, key));

    if !store.exists(&path) {
        store.create(&path, time - 1, schema).await?;
    }

    store.update(&path, time, values).await
}
