pub mod parse;
pub mod sample;
pub mod stats;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::SystemTime;

use tokio::net::UdpSocket;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use self::parse::parse_sample;
use self::sample::Sample;
use self::stats::IngestStats;
use crate::resolver::{HostResolver, ReverseLookup};
use crate::slices::SliceStore;

/// Samples the slicer applies per wake before yielding.
const SLICER_BATCH: usize = 256;

/// Creates the bounded queue between the listener and the slicer.
pub fn queue(capacity: usize) -> (mpsc::Sender<Sample>, mpsc::Receiver<Sample>) {
    mpsc::channel(capacity.max(1))
}

/// UDP receive loop.
///
/// Parses each datagram, resolves its source, and forwards the sample to the
/// slicer without waiting: when the queue is full the sample is dropped.
pub struct Listener<L> {
    socket: UdpSocket,
    resolver: HostResolver<L>,
    tx: mpsc::Sender<Sample>,
    stats: Arc<IngestStats>,
    buf_size: usize,
}

impl<L: ReverseLookup> Listener<L> {
    pub fn new(
        socket: UdpSocket,
        resolver: HostResolver<L>,
        tx: mpsc::Sender<Sample>,
        stats: Arc<IngestStats>,
        buf_size: usize,
    ) -> Self {
        Self {
            socket,
            resolver,
            tx,
            stats,
            buf_size: buf_size.max(1),
        }
    }

    /// Receives datagrams until cancelled or the slicer goes away.
    ///
    /// Datagrams longer than the configured size are dropped whole rather
    /// than parsed truncated.
    pub async fn run(mut self, cancel: CancellationToken) {
        // One spare byte tells an oversized datagram from one that fits exactly.
        let mut buf = vec![0u8; self.buf_size + 1];

        loop {
            let received = tokio::select! {
                _ = cancel.cancelled() => return,
                res = self.socket.recv_from(&mut buf) => res,
            };
            let now = SystemTime::now();

            let (len, peer) = match received {
                Ok(r) => r,
                Err(e) => {
                    self.stats.record_read_error();
                    error!(error = %e, "reading from socket");
                    continue;
                }
            };
            self.stats.record_received();

            if len > self.buf_size {
                self.stats.record_parse_error();
                debug!(%peer, max = self.buf_size, "dropping oversized datagram");
                continue;
            }

            if !self.handle(&buf[..len], peer, now).await {
                info!("slicer stopped, closing listener");
                return;
            }
        }
    }

    /// Processes one datagram. Returns false once the queue is closed.
    async fn handle(&mut self, payload: &[u8], peer: SocketAddr, received_at: SystemTime) -> bool {
        let (metric, value) = match parse_sample(payload) {
            Ok(parsed) => parsed,
            Err(e) => {
                self.stats.record_parse_error();
                debug!(%peer, error = %e, "dropping malformed sample");
                return true;
            }
        };

        let host = self.resolver.resolve(peer.ip()).await;
        let sample = Sample::new(host, metric, value, received_at);

        match self.tx.try_send(sample) {
            Ok(()) => {
                self.stats.record_accepted();
                true
            }
            Err(TrySendError::Full(sample)) => {
                self.stats.record_dropped();
                warn!(key = %sample.key(), "ingest queue full, dropping sample");
                true
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

/// Drains the queue into the slice store until every sender is gone.
///
/// Sole caller of `SliceStore::add`, so samples land in dequeue order.
pub async fn run_slicer(mut rx: mpsc::Receiver<Sample>, store: Arc<SliceStore>) {
    let mut batch = Vec::with_capacity(SLICER_BATCH);

    while rx.recv_many(&mut batch, SLICER_BATCH).await > 0 {
        for sample in batch.drain(..) {
            store.add(sample);
        }
    }

    debug!("ingest queue closed, slicer exiting");
}
