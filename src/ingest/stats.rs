use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters for the ingest path.
///
/// `snapshot()` atomically reads and resets all counters, making it
/// suitable for periodic reporting without contention.
#[derive(Default)]
pub struct IngestStats {
    received: AtomicU64,
    accepted: AtomicU64,
    parse_errors: AtomicU64,
    dropped: AtomicU64,
    read_errors: AtomicU64,
}

/// Point-in-time view of ingest counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSnapshot {
    pub received: u64,
    pub accepted: u64,
    pub parse_errors: u64,
    pub dropped: u64,
    pub read_errors: u64,
}

impl IngestSnapshot {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl IngestStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_parse_error(&self) {
        self.parse_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_read_error(&self) {
        self.read_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Atomically read and reset all counters.
    pub fn snapshot(&self) -> IngestSnapshot {
        IngestSnapshot {
            received: self.received.swap(0, Ordering::Relaxed),
            accepted: self.accepted.swap(0, Ordering::Relaxed),
            parse_errors: self.parse_errors.swap(0, Ordering::Relaxed),
            dropped: self.dropped.swap(0, Ordering::Relaxed),
            read_errors: self.read_errors.swap(0, Ordering::Relaxed),
        }
    }
}
