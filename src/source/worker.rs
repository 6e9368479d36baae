use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{Receiver, RecvTimeoutError, TryRecvError};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::FeedError;
use crate::source::{ChannelQueues, ReconnectBackoff, SourceAdapter, SourceHandle};

/// Connection health of one source, shared between its worker and the
/// controller.
#[derive(Debug, Default)]
pub struct SourceHealth {
    connected: AtomicBool,
    stale: AtomicBool,
    ever_connected: AtomicBool,
    connect_failures: AtomicU64,
    parse_errors: AtomicU64,
    reconnects: AtomicU64,
    samples_received: AtomicU64,
    last_error: Mutex<Option<String>>,
    handle: Mutex<Option<SourceHandle>>,
}

impl SourceHealth {
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// A source is stale once it lost (or never got) its transport.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.stale.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn connect_failures(&self) -> u64 {
        self.connect_failures.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn parse_errors(&self) -> u64 {
        self.parse_errors.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn reconnects(&self) -> u64 {
        self.reconnects.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn samples_received(&self) -> u64 {
        self.samples_received.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    #[must_use]
    pub fn handle(&self) -> Option<SourceHandle> {
        self.handle.lock().clone()
    }

    fn mark_connected(&self, handle: SourceHandle) {
        if self.ever_connected.swap(true, Ordering::AcqRel) {
            self.reconnects.fetch_add(1, Ordering::Relaxed);
        }
        *self.handle.lock() = Some(handle);
        self.connected.store(true, Ordering::Release);
        self.stale.store(false, Ordering::Release);
    }

    fn mark_lost(&self, err: &FeedError) {
        self.connected.store(false, Ordering::Release);
        self.stale.store(true, Ordering::Release);
        *self.last_error.lock() = Some(err.to_string());
    }

    fn record_connect_failure(&self, err: &FeedError) {
        self.connect_failures.fetch_add(1, Ordering::Relaxed);
        self.mark_lost(err);
    }

    fn record_parse_error(&self, err: &FeedError) {
        self.parse_errors.fetch_add(1, Ordering::Relaxed);
        *self.last_error.lock() = Some(err.to_string());
    }

    fn record_samples(&self, count: usize) {
        self.samples_received
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn mark_stopped(&self) {
        self.connected.store(false, Ordering::Release);
        self.stale.store(true, Ordering::Release);
    }
}

/// Everything a worker thread owns.
pub(crate) struct Worker {
    pub(crate) adapter: Box<dyn SourceAdapter>,
    pub(crate) queues: ChannelQueues,
    pub(crate) health: Arc<SourceHealth>,
    pub(crate) backoff: ReconnectBackoff,
    pub(crate) read_timeout: Duration,
    /// Disconnects when the controller shuts down.
    pub(crate) shutdown: Receiver<()>,
}

impl Worker {
    pub(crate) fn spawn(self) -> io::Result<JoinHandle<()>> {
        let name = format!("feed-{}", self.adapter.id());
        thread::Builder::new().name(name).spawn(move || self.run())
    }

    fn run(mut self) {
        let source = self.adapter.id().to_owned();
        let _stopped = MarkStoppedOnExit(Arc::clone(&self.health));
        debug!(source = %source, "source worker started");

        'session: while !self.shutdown_requested() {
            match self.adapter.connect() {
                Ok(handle) => {
                    info!(
                        source = %source,
                        kind = %handle.kind,
                        endpoint = %handle.endpoint,
                        "source connected"
                    );
                    self.backoff.reset();
                    self.health.mark_connected(handle);
                    if self.pump() {
                        break 'session;
                    }
                }
                Err(err) => {
                    self.health.record_connect_failure(&err);
                    debug!(source = %source, error = %err, "connect failed");
                }
            }

            let delay = self.backoff.next_delay();
            debug!(
                source = %source,
                delay_ms = delay.as_millis() as u64,
                attempt = self.backoff.failures(),
                "waiting before reconnect"
            );
            match self.shutdown.recv_timeout(delay) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break 'session,
            }
        }

        self.adapter.disconnect();
        debug!(source = %source, "source worker stopped");
    }

    /// Reads until the transport is lost. Returns `true` on shutdown.
    fn pump(&mut self) -> bool {
        loop {
            if self.shutdown_requested() {
                return true;
            }
            match self.adapter.read(self.read_timeout) {
                Ok(samples) => {
                    if samples.is_empty() {
                        continue;
                    }
                    self.health.record_samples(samples.len());
                    for sample in samples {
                        self.queues.publish(sample);
                    }
                }
                Err(err) if err.is_parse() => {
                    self.health.record_parse_error(&err);
                    debug!(source = %self.adapter.id(), error = %err, "dropped malformed record");
                }
                Err(err) => {
                    warn!(source = %self.adapter.id(), error = %err, "source lost");
                    self.health.mark_lost(&err);
                    self.adapter.disconnect();
                    return false;
                }
            }
        }
    }

    fn shutdown_requested(&self) -> bool {
        matches!(
            self.shutdown.try_recv(),
            Ok(()) | Err(TryRecvError::Disconnected)
        )
    }
}

/// Flags the source stopped however the worker thread ends, unwinding included.
struct MarkStoppedOnExit(Arc<SourceHealth>);

impl Drop for MarkStoppedOnExit {
    fn drop(&mut self) {
        self.0.mark_stopped();
    }
}
