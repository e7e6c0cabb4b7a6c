use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::Config;
use crate::ingest::stats::IngestStats;
use crate::ingest::{self, Listener};
use crate::persist::{RoundRobinStore, RrdTool};
use crate::resolver::{HostResolver, ReverseLookup, SystemLookup};
use crate::rollup::RollupScheduler;
use crate::slices::SliceStore;
use crate::writer::Writer;

/// Agent orchestrates all components: listener, slicer, rollup scheduler.
///
/// Ingest and rollup have separate cancellation tokens so shutdown can stop
/// intake first and let the rollup task harvest everything that arrived.
pub struct Agent {
    cfg: Config,
    store: Arc<SliceStore>,
    stats: Arc<IngestStats>,
    ingest_cancel: CancellationToken,
    rollup_cancel: CancellationToken,
    local_addr: Option<SocketAddr>,
    listener: Option<JoinHandle<()>>,
    slicer: Option<JoinHandle<()>>,
    rollup: Option<JoinHandle<()>>,
}

impl Agent {
    /// Creates a new Agent from a validated configuration.
    pub fn new(cfg: Config) -> Result<Self> {
        cfg.validate().context("validating config")?;

        let store = Arc::new(SliceStore::new(cfg.slice_interval, cfg.max_pending_windows));

        Ok(Self {
            cfg,
            store,
            stats: Arc::new(IngestStats::new()),
            ingest_cancel: CancellationToken::new(),
            rollup_cancel: CancellationToken::new(),
            local_addr: None,
            listener: None,
            slicer: None,
            rollup: None,
        })
    }

    /// Start with the rrdtool backend and the system resolver.
    pub async fn start(&mut self) -> Result<()> {
        let data_dir = self.cfg.data_dir_absolute()?;
        let backend = RrdTool::new(&self.cfg.rrdtool, data_dir, self.cfg.slice_secs());
        self.start_with(backend, SystemLookup).await
    }

    /// Start all components with the given persistence backend and resolver.
    pub async fn start_with<S, L>(&mut self, backend: S, lookup: L) -> Result<()>
    where
        S: RoundRobinStore + 'static,
        L: ReverseLookup + 'static,
    {
        // 1. Data directory.
        let data_dir = backend.data_dir().to_path_buf();
        tokio::fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("creating data directory {}", data_dir.display()))?;

        // 2. Socket.
        let bind_addr = self.cfg.bind_addr();
        let socket = UdpSocket::bind(&bind_addr)
            .await
            .with_context(|| format!("binding UDP socket {bind_addr}"))?;
        let local_addr = socket.local_addr().context("reading bound address")?;
        self.local_addr = Some(local_addr);

        info!(
            listen = %local_addr,
            data_dir = %data_dir.display(),
            slice_interval = ?self.cfg.slice_interval,
            write_interval = ?self.cfg.write_interval,
            "listening for samples",
        );

        // 3. Ingest: listener -> queue -> slicer.
        let (tx, rx) = ingest::queue(self.cfg.queue_capacity);
        let resolver = HostResolver::new(lookup, self.cfg.resolve_hosts);
        let listener = Listener::new(
            socket,
            resolver,
            tx,
            Arc::clone(&self.stats),
            self.cfg.max_datagram_size,
        );
        self.listener = Some(tokio::spawn(listener.run(self.ingest_cancel.clone())));
        self.slicer = Some(tokio::spawn(ingest::run_slicer(rx, Arc::clone(&self.store))));

        // 4. Rollup.
        let scheduler = RollupScheduler::new(
            Arc::clone(&self.store),
            Writer::defaults(),
            backend,
            self.cfg.write_interval,
        );
        self.rollup = Some(tokio::spawn(scheduler.run(self.rollup_cancel.clone())));

        // 5. Background monitors.
        self.spawn_stats_reporter();

        info!("agent fully started");

        Ok(())
    }

    /// Gracefully stop all components.
    ///
    /// Intake stops first; once the slicer has applied every queued sample
    /// the rollup task performs its final harvest.
    pub async fn stop(&mut self) -> Result<()> {
        self.ingest_cancel.cancel();

        // The listener owns the only sender; its exit closes the queue and
        // lets the slicer drain and finish.
        for (name, handle) in [("listener", self.listener.take()), ("slicer", self.slicer.take())] {
            if let Some(handle) = handle {
                if let Err(e) = handle.await {
                    error!(task = name, error = %e, "task ended abnormally");
                }
            }
        }

        self.rollup_cancel.cancel();
        if let Some(handle) = self.rollup.take() {
            handle.await.context("waiting for final rollup")?;
        }

        let remaining = self.stats.snapshot();
        if !remaining.is_empty() {
            info!(
                received = remaining.received,
                accepted = remaining.accepted,
                parse_errors = remaining.parse_errors,
                dropped = remaining.dropped,
                read_errors = remaining.read_errors,
                "ingest stats at shutdown",
            );
        }

        Ok(())
    }

    /// Address the UDP socket is bound to, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// The shared slice store.
    pub fn store(&self) -> &Arc<SliceStore> {
        &self.store
    }

    /// Spawn background ingest stats reporter.
    fn spawn_stats_reporter(&self) {
        let cancel = self.ingest_cancel.clone();
        let stats = Arc::clone(&self.stats);
        let store = Arc::clone(&self.store);
        let interval = self.cfg.stats_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = ticker.tick() => {
                        let snapshot = stats.snapshot();
                        if snapshot.is_empty() {
                            continue;
                        }

                        info!(
                            received = snapshot.received,
                            accepted = snapshot.accepted,
                            parse_errors = snapshot.parse_errors,
                            dropped = snapshot.dropped,
                            read_errors = snapshot.read_errors,
                            windows = store.len(),
                            period = ?interval,
                            "ingest stats",
                        );
                    }
                }
            }
        });
    }
}
