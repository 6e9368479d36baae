use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::core::{AppendOutcome, ChannelId};
use crate::error::{FeedError, FeedResult};
use crate::render::{DrawingBackend, FrameBatch, RenderFrame, RenderSurface};
use crate::source::worker::Worker;
use crate::source::{
    ChannelQueues, ReconnectBackoff, SourceAdapter, SourceHealth, TransportKind, create_adapter,
};

use super::channel_registry::ChannelRegistry;
use super::chart_pipeline::FrameInput;
use super::{ChartPipeline, RenderProfile, SessionConfig};

const JOIN_POLL: Duration = Duration::from_millis(5);

/// Cloneable trigger that stops a running [`LiveFeedController::run`] loop.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Sender<()>,
    fired: Arc<AtomicBool>,
}

impl ShutdownHandle {
    pub fn trigger(&self) {
        if !self.fired.swap(true, Ordering::AcqRel) {
            let _ = self.tx.try_send(());
        }
    }

    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }
}

/// Session-wide counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FeedStats {
    pub ticks: u64,
    pub samples_ingested: u64,
    pub evictions: u64,
    pub out_of_order: u64,
    pub foreign_rejected: u64,
    pub queue_drops: u64,
    pub decimation_failures: u64,
    pub surface_errors: u64,
}

/// Outcome of one controller tick.
#[derive(Debug, Clone)]
pub struct TickReport {
    pub batch: FrameBatch,
    /// Samples moved from queues into buffers during this tick.
    pub ingested: usize,
    /// Channels whose frame could not be built this tick.
    pub failures: Vec<(ChannelId, FeedError)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelStatus {
    pub channel: ChannelId,
    pub source_id: String,
    pub len: usize,
    pub capacity: usize,
    pub evicted: u64,
    pub rejected: u64,
    pub foreign_rejected: u64,
    pub newest_timestamp: Option<f64>,
    pub stale: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceStatus {
    pub id: String,
    pub kind: TransportKind,
    pub endpoint: Option<String>,
    pub connected: bool,
    pub stale: bool,
    pub connect_failures: u64,
    pub parse_errors: u64,
    pub reconnects: u64,
    pub samples_received: u64,
    pub queue_drops: u64,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Running,
    Closed,
}

struct SourceSlot {
    id: String,
    kind: TransportKind,
    adapter: Option<Box<dyn SourceAdapter>>,
    queues: ChannelQueues,
    health: Arc<SourceHealth>,
    worker: Option<JoinHandle<()>>,
}

/// Drives ingestion and frame emission for one dashboard session.
///
/// Every adapter runs on its own worker thread and hands samples over
/// through bounded per-channel queues. Buffers and frames are only touched
/// on the thread that calls [`tick`](Self::tick) or [`run`](Self::run).
///
/// Lifecycle: `new` -> optional `add_source` -> `start` -> `tick`/`run` ->
/// `shutdown`. After shutdown no further batch is produced.
pub struct LiveFeedController {
    config: SessionConfig,
    profile: RenderProfile,
    backend: DrawingBackend,
    pipeline: ChartPipeline,
    registry: ChannelRegistry,
    sources: Vec<SourceSlot>,
    worker_stop: Option<Sender<()>>,
    worker_stop_rx: Receiver<()>,
    run_stop: ShutdownHandle,
    run_stop_rx: Receiver<()>,
    state: State,
    sequence: u64,
    stats: FeedStats,
}

impl LiveFeedController {
    /// Validates the configuration, fixes the render profile and builds the
    /// configured adapters. Fails with a configuration error; never connects.
    pub fn new(config: SessionConfig) -> FeedResult<Self> {
        config.validate()?;
        let profile = config.resolve_profile()?;
        let pipeline = ChartPipeline::from_config(&profile, &config)?;
        let backend = DrawingBackend::for_profile(&profile);
        let registry = ChannelRegistry::new(profile.max_points, &config.channels);

        let (worker_stop, worker_stop_rx) = channel::bounded(0);
        let (run_tx, run_stop_rx) = channel::bounded(1);

        let mut controller = Self {
            profile,
            backend,
            pipeline,
            registry,
            sources: Vec::new(),
            worker_stop: Some(worker_stop),
            worker_stop_rx,
            run_stop: ShutdownHandle {
                tx: run_tx,
                fired: Arc::new(AtomicBool::new(false)),
            },
            run_stop_rx,
            state: State::Idle,
            sequence: 0,
            stats: FeedStats::default(),
            config,
        };

        let read_timeout = controller.config.read_timeout();
        let adapters = controller
            .config
            .sources
            .iter()
            .map(|source| create_adapter(source, read_timeout))
            .collect::<FeedResult<Vec<_>>>()?;
        for adapter in adapters {
            controller.add_source(adapter)?;
        }

        info!(
            mode = ?controller.profile.mode,
            max_points = controller.profile.max_points,
            update_interval_ms = controller.profile.update_interval.as_millis() as u64,
            backend = ?controller.backend,
            sources = controller.sources.len(),
            "live feed session created"
        );
        Ok(controller)
    }

    /// Registers an extra adapter. Only allowed before [`start`](Self::start).
    pub fn add_source(&mut self, adapter: Box<dyn SourceAdapter>) -> FeedResult<()> {
        match self.state {
            State::Closed => return Err(FeedError::SessionClosed),
            State::Running => {
                return Err(FeedError::Configuration(
                    "sources must be added before start".to_owned(),
                ));
            }
            State::Idle => {}
        }
        let id = adapter.id().to_owned();
        if self.sources.iter().any(|slot| slot.id == id) {
            return Err(FeedError::Configuration(format!(
                "duplicate source id `{id}`"
            )));
        }
        debug!(source = %id, kind = %adapter.kind(), "source added");
        self.sources.push(SourceSlot {
            kind: adapter.kind(),
            id,
            adapter: Some(adapter),
            queues: ChannelQueues::new(self.config.queue_capacity),
            health: Arc::new(SourceHealth::default()),
            worker: None,
        });
        Ok(())
    }

    /// Spawns one worker thread per source. Idempotent while running.
    pub fn start(&mut self) -> FeedResult<()> {
        match self.state {
            State::Closed => return Err(FeedError::SessionClosed),
            State::Running => return Ok(()),
            State::Idle => {}
        }

        for slot in &mut self.sources {
            let Some(adapter) = slot.adapter.take() else {
                continue;
            };
            let worker = Worker {
                adapter,
                queues: slot.queues.clone(),
                health: Arc::clone(&slot.health),
                backoff: ReconnectBackoff::new(self.config.backoff)?,
                read_timeout: self.config.read_timeout(),
                shutdown: self.worker_stop_rx.clone(),
            };
            let handle = worker.spawn().map_err(|e| {
                FeedError::Configuration(format!("failed to spawn worker for `{}`: {e}", slot.id))
            })?;
            slot.worker = Some(handle);
        }

        self.state = State::Running;
        info!(sources = self.sources.len(), "live feed started");
        Ok(())
    }

    /// Drains queued samples into buffers and builds one batch.
    ///
    /// Channels whose source is stale are emitted flagged `stale`. Their
    /// sources produce nothing new until they reconnect, but samples queued
    /// before the loss still reach the buffer.
    pub fn tick(&mut self) -> FeedResult<TickReport> {
        if self.state == State::Closed {
            return Err(FeedError::SessionClosed);
        }

        let ingested = self.ingest()?;
        let (frames, failures) = self.build_frames();
        self.stats.decimation_failures += failures.len() as u64;

        self.sequence += 1;
        self.stats.ticks += 1;
        let batch = FrameBatch::new(self.sequence, frames);
        trace!(
            sequence = batch.sequence,
            frames = batch.frames.len(),
            points = batch.point_count(),
            ingested,
            "tick"
        );
        Ok(TickReport {
            batch,
            ingested,
            failures,
        })
    }

    fn ingest(&mut self) -> FeedResult<usize> {
        let mut ingested = 0;
        for (owner, slot) in self.sources.iter().enumerate() {
            for (channel, queue) in slot.queues.snapshot() {
                let entry = self.registry.entry_or_register(&channel, owner)?;
                if entry.owner != owner {
                    let rejected = queue.drain(usize::MAX).len() as u64;
                    if rejected > 0 {
                        entry.foreign_rejected += rejected;
                        self.stats.foreign_rejected += rejected;
                        debug!(
                            channel = %channel,
                            source = %slot.id,
                            rejected,
                            "samples from non-owning source rejected"
                        );
                    }
                    continue;
                }
                // A stale source produces nothing new; whatever it queued
                // before the loss is still ingested.
                for sample in queue.drain(usize::MAX) {
                    match entry.buffer.append(sample) {
                        Ok(AppendOutcome::Appended) => ingested += 1,
                        Ok(AppendOutcome::Evicted) => {
                            ingested += 1;
                            self.stats.evictions += 1;
                        }
                        Err(err) => {
                            self.stats.out_of_order += 1;
                            trace!(channel = %channel, error = %err, "sample rejected");
                        }
                    }
                }
            }
        }
        self.stats.samples_ingested += ingested as u64;
        Ok(ingested)
    }

    fn build_frames(&mut self) -> (Vec<RenderFrame>, Vec<(ChannelId, FeedError)>) {
        let stale: Vec<bool> = self
            .registry
            .iter()
            .map(|(_, entry)| self.sources[entry.owner].health.is_stale())
            .collect();

        let inputs: Vec<FrameInput<'_>> = self
            .registry
            .iter()
            .map(|(channel, entry)| FrameInput {
                channel,
                buffer: &entry.buffer,
                meta: &entry.meta,
            })
            .collect();
        let built = self.pipeline.build_frames(&inputs);

        let mut frames = Vec::with_capacity(built.len());
        let mut failures = Vec::new();
        for (((channel, entry), result), stale) in
            self.registry.iter_mut().zip(built).zip(stale)
        {
            match (result, stale) {
                (Ok(frame), false) => {
                    entry.last_frame = Some(frame.clone());
                    frames.push(frame);
                }
                (Ok(frame), true) => {
                    entry.last_frame = Some(frame.clone());
                    frames.push(frame.marked_stale());
                }
                (Err(err), true) => match entry.last_frame.clone() {
                    Some(last) => {
                        debug!(channel = %channel, error = %err, "reusing last frame of stale channel");
                        frames.push(last.marked_stale());
                    }
                    None => failures.push((channel.clone(), err)),
                },
                (Err(err), false) => {
                    warn!(channel = %channel, error = %err, "frame build failed");
                    failures.push((channel.clone(), err));
                }
            }
        }
        (frames, failures)
    }

    /// Ticks at the profile's update interval, presenting every batch, until
    /// the [`ShutdownHandle`] fires. Shuts the session down before returning.
    pub fn run<S: RenderSurface + ?Sized>(&mut self, surface: &mut S) -> FeedResult<()> {
        self.start()?;
        surface.attach(self.backend)?;
        let interval = self.profile.update_interval;
        info!(interval_ms = interval.as_millis() as u64, "cadence loop running");

        loop {
            let started = Instant::now();
            let report = self.tick()?;
            if let Err(err) = surface.present(&report.batch) {
                self.stats.surface_errors += 1;
                warn!(sequence = report.batch.sequence, error = %err, "surface rejected batch");
            }

            let wait = interval.saturating_sub(started.elapsed());
            match self.run_stop_rx.recv_timeout(wait) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        self.shutdown();
        Ok(())
    }

    /// Stops every worker and guarantees no further batch.
    ///
    /// Workers get `drain_timeout` to exit; any still running after that are
    /// detached. Queued samples are discarded and buffers cleared.
    pub fn shutdown(&mut self) {
        if self.state == State::Closed {
            return;
        }
        self.state = State::Closed;
        self.run_stop.trigger();
        // Dropping the only sender wakes every worker's receiver.
        self.worker_stop.take();

        let deadline = Instant::now() + self.config.drain_timeout();
        let mut detached = 0;
        for slot in &mut self.sources {
            if let Some(mut adapter) = slot.adapter.take() {
                adapter.disconnect();
            }
            let Some(handle) = slot.worker.take() else {
                continue;
            };
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(JOIN_POLL);
            }
            if handle.is_finished() {
                if handle.join().is_err() {
                    warn!(source = %slot.id, "source worker panicked");
                }
            } else {
                detached += 1;
                warn!(source = %slot.id, "source worker did not stop in time, detaching");
            }
            slot.health.mark_stopped();
        }

        let discarded: usize = self
            .sources
            .iter()
            .map(|slot| slot.queues.discard_all())
            .sum();
        self.stats.queue_drops = self.queue_drops();
        self.registry.clear_buffers();
        info!(
            ticks = self.stats.ticks,
            discarded,
            detached,
            "live feed shut down"
        );
    }

    #[must_use]
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.run_stop.clone()
    }

    #[must_use]
    pub fn profile(&self) -> &RenderProfile {
        &self.profile
    }

    #[must_use]
    pub fn backend(&self) -> DrawingBackend {
        self.backend
    }

    #[must_use]
    pub fn pipeline(&self) -> &ChartPipeline {
        &self.pipeline
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state == State::Running
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state == State::Closed
    }

    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.registry.len()
    }

    #[must_use]
    pub fn stats(&self) -> FeedStats {
        let mut stats = self.stats;
        if self.state != State::Closed {
            stats.queue_drops = self.queue_drops();
        }
        stats
    }

    fn queue_drops(&self) -> u64 {
        self.sources
            .iter()
            .map(|slot| slot.queues.dropped_count())
            .sum()
    }

    #[must_use]
    pub fn channel_statuses(&self) -> Vec<ChannelStatus> {
        self.registry
            .iter()
            .map(|(channel, entry)| {
                let source = &self.sources[entry.owner];
                ChannelStatus {
                    channel: channel.clone(),
                    source_id: source.id.clone(),
                    len: entry.buffer.len(),
                    capacity: entry.buffer.capacity(),
                    evicted: entry.buffer.evicted_count(),
                    rejected: entry.buffer.rejected_count(),
                    foreign_rejected: entry.foreign_rejected,
                    newest_timestamp: entry.buffer.newest().map(|sample| sample.timestamp()),
                    stale: source.health.is_stale(),
                }
            })
            .collect()
    }

    #[must_use]
    pub fn source_statuses(&self) -> Vec<SourceStatus> {
        self.sources
            .iter()
            .map(|slot| SourceStatus {
                id: slot.id.clone(),
                kind: slot.kind,
                endpoint: slot.health.handle().map(|handle| handle.endpoint),
                connected: slot.health.is_connected(),
                stale: slot.health.is_stale(),
                connect_failures: slot.health.connect_failures(),
                parse_errors: slot.health.parse_errors(),
                reconnects: slot.health.reconnects(),
                samples_received: slot.health.samples_received(),
                queue_drops: slot.queues.dropped_count(),
                last_error: slot.health.last_error(),
            })
            .collect()
    }
}

impl Drop for LiveFeedController {
    fn drop(&mut self) {
        self.shutdown();
    }
}
