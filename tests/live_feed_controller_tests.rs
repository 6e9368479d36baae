use std::io::Write;
use std::thread;
use std::time::{Duration, Instant};

use tempfile::NamedTempFile;
use telemetry_feed::api::{ChannelSpec, ProfileOverrides, TickReport};
use telemetry_feed::core::{ChannelId, Sample};
use telemetry_feed::render::{ChannelSurface, DrawingBackend, NullSurface};
use telemetry_feed::source::{
    BackoffPolicy, LocalBus, PubSubAdapter, SourceAdapter, SourceConfig, SourceHandle,
    TransportKind,
};
use telemetry_feed::{FeedError, FeedResult, LiveFeedController, SessionConfig};

const DEADLINE: Duration = Duration::from_secs(5);

fn fast_config() -> SessionConfig {
    SessionConfig::new()
        .with_read_timeout(Duration::from_millis(10))
        .with_drain_timeout(Duration::from_millis(500))
        .with_backoff(BackoffPolicy::new(
            Duration::from_millis(20),
            Duration::from_millis(40),
        ))
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let started = Instant::now();
    while started.elapsed() < DEADLINE {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    false
}

/// Ticks until `accept` is satisfied by a report and returns that report.
fn tick_until(
    controller: &mut LiveFeedController,
    mut accept: impl FnMut(&TickReport) -> bool,
) -> TickReport {
    let started = Instant::now();
    loop {
        let report = controller.tick().expect("tick");
        if accept(&report) {
            return report;
        }
        assert!(started.elapsed() < DEADLINE, "condition not reached in time");
        thread::sleep(Duration::from_millis(2));
    }
}

fn frame_len(report: &TickReport, channel: &str) -> usize {
    report.batch.frame(channel).map_or(0, |frame| frame.len())
}

fn record(channel: &str, value: f64, t: f64) -> String {
    format!(r#"{{"channel_id":"{channel}","value":{value},"timestamp":{t}}}"#)
}

fn source_connected(controller: &LiveFeedController, id: &str) -> bool {
    controller
        .source_statuses()
        .iter()
        .any(|status| status.id == id && status.connected)
}

fn source_stale(controller: &LiveFeedController, id: &str) -> bool {
    controller
        .source_statuses()
        .iter()
        .any(|status| status.id == id && status.stale)
}

#[test]
fn invalid_configuration_fails_fast() {
    let err = LiveFeedController::new(fast_config().with_queue_capacity(0)).err();
    assert!(matches!(err, Some(FeedError::Configuration(_))));

    let overrides = ProfileOverrides::default().with_max_points(0);
    let err = LiveFeedController::new(fast_config().with_profile_overrides(overrides)).err();
    assert!(matches!(err, Some(FeedError::Configuration(_))));

    let replay = SourceConfig::Replay {
        id: "rec".to_owned(),
        path: "rec.ndjson".into(),
        speed: 0.0,
        realtime: true,
        loop_playback: false,
        default_interval_ms: 500,
    };
    assert!(LiveFeedController::new(fast_config().with_source(replay)).is_err());
}

#[test]
fn embedded_sessions_use_the_software_backend() {
    let controller =
        LiveFeedController::new(fast_config().with_embedded(true)).expect("controller");
    assert!(controller.profile().is_embedded());
    assert_eq!(controller.profile().max_points, 2000);
    assert_eq!(controller.backend(), DrawingBackend::Software);

    let controller = LiveFeedController::new(fast_config()).expect("controller");
    assert_eq!(controller.backend(), DrawingBackend::Accelerated);
}

#[cfg(not(feature = "serial"))]
#[test]
fn serial_sources_need_the_serial_feature() {
    let serial = SourceConfig::Serial {
        id: "gps".to_owned(),
        port: "/dev/ttyUSB0".to_owned(),
        baud_rate: 9600,
    };
    let err = LiveFeedController::new(fast_config().with_source(serial)).err();
    assert!(matches!(err, Some(FeedError::Configuration(_))));
}

#[test]
fn disconnected_source_goes_stale_without_affecting_others() {
    let bus_a = LocalBus::new();
    let bus_b = LocalBus::new();
    let mut controller = LiveFeedController::new(fast_config()).expect("controller");
    controller
        .add_source(Box::new(PubSubAdapter::local("a", &bus_a, "")))
        .expect("source a");
    controller
        .add_source(Box::new(PubSubAdapter::local("b", &bus_b, "")))
        .expect("source b");
    controller.start().expect("start");
    assert!(wait_until(|| source_connected(&controller, "a") && source_connected(&controller, "b")));

    for t in [1.0, 2.0] {
        bus_a.publish("alt", record("alt", 100.0 * t, t));
        bus_b.publish("temp", record("temp", 20.0 + t, t));
    }
    let before = tick_until(&mut controller, |report| {
        frame_len(report, "alt") == 2 && frame_len(report, "temp") == 2
    });
    let frozen = before.batch.frame("alt").expect("alt").points.clone();

    bus_a.close();
    assert!(wait_until(|| source_stale(&controller, "a")));
    assert_eq!(bus_a.publish("alt", record("alt", 300.0, 3.0)), 0);
    bus_b.publish("temp", record("temp", 23.0, 3.0));

    let after = tick_until(&mut controller, |report| frame_len(report, "temp") == 3);
    let alt = after.batch.frame("alt").expect("stale frame still emitted");
    assert!(alt.stale);
    assert_eq!(alt.points, frozen);
    assert!(!after.batch.frame("temp").expect("temp").stale);
    let stale: Vec<&ChannelId> = after.batch.stale_channels().collect();
    assert_eq!(stale.len(), 1);
    assert!(after.failures.is_empty());

    let statuses = controller.channel_statuses();
    assert!(statuses.iter().any(|s| s.channel.as_str() == "alt" && s.stale));
    assert!(statuses.iter().any(|s| s.channel.as_str() == "temp" && !s.stale));

    controller.shutdown();
    assert!(controller.is_closed());
    assert!(matches!(controller.tick(), Err(FeedError::SessionClosed)));
    assert!(matches!(controller.start(), Err(FeedError::SessionClosed)));
    assert!(controller.source_statuses().iter().all(|s| !s.connected));
}

#[test]
fn source_recovers_after_reconnect() {
    let bus = LocalBus::new();
    let mut controller = LiveFeedController::new(fast_config()).expect("controller");
    controller
        .add_source(Box::new(PubSubAdapter::local("a", &bus, "")))
        .expect("source");
    controller.start().expect("start");
    assert!(wait_until(|| source_connected(&controller, "a")));

    bus.close();
    assert!(wait_until(|| {
        controller
            .source_statuses()
            .iter()
            .any(|s| s.id == "a" && s.stale && s.connect_failures >= 1)
    }));
    bus.reopen();
    assert!(wait_until(|| source_connected(&controller, "a")));

    bus.publish("alt", record("alt", 1.0, 1.0));
    let report = tick_until(&mut controller, |report| frame_len(report, "alt") == 1);
    assert!(!report.batch.frame("alt").expect("alt").stale);

    let status = controller
        .source_statuses()
        .into_iter()
        .find(|s| s.id == "a")
        .expect("status");
    assert_eq!(status.reconnects, 1);
    assert!(status.connect_failures >= 1);
    assert!(status.last_error.is_some());
}

#[test]
fn run_stops_on_shutdown_handle() {
    let bus = LocalBus::new();
    let overrides = ProfileOverrides::default().with_update_interval(Duration::from_millis(10));
    let mut controller =
        LiveFeedController::new(fast_config().with_profile_overrides(overrides))
            .expect("controller");
    controller
        .add_source(Box::new(PubSubAdapter::local("a", &bus, "")))
        .expect("source");

    let handle = controller.shutdown_handle();
    let publisher = {
        let bus = bus.clone();
        thread::spawn(move || {
            for t in 1..=10 {
                bus.publish("alt", record("alt", f64::from(t), f64::from(t)));
                thread::sleep(Duration::from_millis(10));
            }
            thread::sleep(Duration::from_millis(100));
            handle.trigger();
        })
    };

    let mut surface = NullSurface::default();
    controller.run(&mut surface).expect("run");
    publisher.join().expect("publisher");

    assert!(controller.is_closed());
    assert_eq!(surface.backend, Some(DrawingBackend::Accelerated));
    assert!(surface.presented >= 2);
    assert_eq!(surface.last_sequence, Some(controller.stats().ticks));
    assert!(matches!(controller.tick(), Err(FeedError::SessionClosed)));
}

#[test]
fn channel_surface_receives_ordered_batches() {
    let overrides = ProfileOverrides::default().with_update_interval(Duration::from_millis(5));
    let mut controller =
        LiveFeedController::new(fast_config().with_profile_overrides(overrides))
            .expect("controller");
    let (mut surface, rx) = ChannelSurface::bounded(1024);

    let handle = controller.shutdown_handle();
    let trigger = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        handle.trigger();
    });
    controller.run(&mut surface).expect("run");
    trigger.join().expect("trigger");

    let sequences: Vec<u64> = rx.try_iter().map(|batch| batch.sequence).collect();
    assert!(!sequences.is_empty());
    assert_eq!(sequences[0], 1);
    assert!(sequences.windows(2).all(|pair| pair[1] == pair[0] + 1));
    assert_eq!(surface.dropped_batches(), 0);
}

#[test]
fn first_source_owns_a_channel() {
    let bus_a = LocalBus::new();
    let bus_b = LocalBus::new();
    let mut controller = LiveFeedController::new(fast_config()).expect("controller");
    controller
        .add_source(Box::new(PubSubAdapter::local("a", &bus_a, "")))
        .expect("source a");
    controller
        .add_source(Box::new(PubSubAdapter::local("b", &bus_b, "")))
        .expect("source b");
    controller.start().expect("start");
    assert!(wait_until(|| source_connected(&controller, "a") && source_connected(&controller, "b")));

    bus_a.publish("alt", record("alt", 1.0, 1.0));
    tick_until(&mut controller, |report| frame_len(report, "alt") == 1);

    bus_b.publish("alt", record("alt", 2.0, 2.0));
    assert!(wait_until(|| {
        controller.tick().expect("tick");
        controller.stats().foreign_rejected == 1
    }));

    let report = controller.tick().expect("tick");
    assert_eq!(frame_len(&report, "alt"), 1);
    let status = controller
        .channel_statuses()
        .into_iter()
        .find(|s| s.channel.as_str() == "alt")
        .expect("alt status");
    assert_eq!(status.source_id, "a");
    assert_eq!(status.foreign_rejected, 1);
}

#[test]
fn out_of_order_samples_are_counted_not_fatal() {
    let bus = LocalBus::new();
    let mut controller = LiveFeedController::new(fast_config()).expect("controller");
    controller
        .add_source(Box::new(PubSubAdapter::local("a", &bus, "")))
        .expect("source");
    controller.start().expect("start");
    assert!(wait_until(|| source_connected(&controller, "a")));

    bus.publish("alt", record("alt", 1.0, 5.0));
    bus.publish("alt", record("alt", 2.0, 3.0));
    bus.publish("alt", record("alt", 3.0, 6.0));
    bus.publish("alt", "garbage");

    let report = tick_until(&mut controller, |report| frame_len(report, "alt") == 2);
    let xs: Vec<f64> = report.batch.frame("alt").expect("alt").points.iter().map(|p| p.x).collect();
    assert_eq!(xs, vec![5.0, 6.0]);

    let stats = controller.stats();
    assert_eq!(stats.out_of_order, 1);
    assert_eq!(stats.samples_ingested, 2);
    assert!(wait_until(|| {
        controller
            .source_statuses()
            .iter()
            .any(|s| s.id == "a" && s.parse_errors == 1 && s.connected)
    }));
}

#[test]
fn sources_are_fixed_once_started() {
    let bus = LocalBus::new();
    let mut controller = LiveFeedController::new(fast_config()).expect("controller");
    controller
        .add_source(Box::new(PubSubAdapter::local("a", &bus, "")))
        .expect("source");
    let duplicate = controller.add_source(Box::new(PubSubAdapter::local("a", &bus, "")));
    assert!(matches!(duplicate, Err(FeedError::Configuration(_))));

    controller.start().expect("start");
    controller.start().expect("start is idempotent");
    assert!(controller.is_running());
    let late = controller.add_source(Box::new(PubSubAdapter::local("b", &bus, "")));
    assert!(matches!(late, Err(FeedError::Configuration(_))));

    controller.shutdown();
    controller.shutdown();
    let closed = controller.add_source(Box::new(PubSubAdapter::local("c", &bus, "")));
    assert!(matches!(closed, Err(FeedError::SessionClosed)));
}

#[test]
fn declared_channels_label_their_frames() {
    let bus = LocalBus::new();
    let config = fast_config().with_channel(
        ChannelSpec::new(ChannelId::new("alt").expect("channel"))
            .with_label("Altitude")
            .with_unit("m"),
    );
    let mut controller = LiveFeedController::new(config).expect("controller");
    controller
        .add_source(Box::new(PubSubAdapter::local("a", &bus, "")))
        .expect("source");
    controller.start().expect("start");
    assert!(wait_until(|| source_connected(&controller, "a")));

    bus.publish("alt", record("alt", 1.0, 1.0));
    bus.publish("speed", record("speed", 1.0, 1.0));
    let report = tick_until(&mut controller, |report| {
        frame_len(report, "alt") == 1 && frame_len(report, "speed") == 1
    });

    let alt = report.batch.frame("alt").expect("alt");
    assert_eq!(alt.label.as_deref(), Some("Altitude"));
    assert_eq!(alt.unit.as_deref(), Some("m"));
    assert!(report.batch.frame("speed").expect("speed").label.is_none());
    assert_eq!(controller.channel_count(), 2);
}

#[test]
fn buffers_are_bounded_by_the_profile() {
    let bus = LocalBus::new();
    let overrides = ProfileOverrides::default().with_max_points(16);
    let mut controller = LiveFeedController::new(fast_config().with_profile_overrides(overrides))
        .expect("controller");
    controller
        .add_source(Box::new(PubSubAdapter::local("a", &bus, "")))
        .expect("source");
    controller.start().expect("start");
    assert!(wait_until(|| source_connected(&controller, "a")));

    for t in 0..40 {
        bus.publish("alt", record("alt", f64::from(t), f64::from(t)));
    }
    let report = tick_until(&mut controller, |report| {
        report
            .batch
            .frame("alt")
            .and_then(|frame| frame.last_point())
            .is_some_and(|point| point.x == 39.0)
    });

    assert_eq!(frame_len(&report, "alt"), 16);
    assert_eq!(controller.stats().evictions, 24);
    let status = &controller.channel_statuses()[0];
    assert_eq!(status.len, 16);
    assert_eq!(status.capacity, 16);
    assert_eq!(status.newest_timestamp, Some(39.0));
}

#[test]
fn finished_replay_freezes_its_channels() {
    let mut file = NamedTempFile::new().expect("temp file");
    for (i, t) in [100.0, 101.0, 102.0].iter().enumerate() {
        writeln!(file, "{}", record("alt", i as f64, *t)).expect("write");
    }
    file.flush().expect("flush");

    let replay = SourceConfig::Replay {
        id: "rec".to_owned(),
        path: file.path().to_path_buf(),
        speed: 10.0,
        realtime: true,
        loop_playback: false,
        default_interval_ms: 2_000,
    };
    let mut controller =
        LiveFeedController::new(fast_config().with_source(replay)).expect("controller");
    controller.start().expect("start");

    let live = tick_until(&mut controller, |report| frame_len(report, "alt") == 3);
    assert!(!live.batch.frame("alt").expect("alt").stale);

    assert!(wait_until(|| source_stale(&controller, "rec")));
    let report = controller.tick().expect("tick");
    let alt = report.batch.frame("alt").expect("alt");
    assert!(alt.stale);
    assert_eq!(alt.len(), 3);
}

#[test]
fn samples_delivered_before_a_disconnect_are_kept() {
    let bus = LocalBus::new();
    let mut controller = LiveFeedController::new(fast_config()).expect("controller");
    controller
        .add_source(Box::new(PubSubAdapter::local("a", &bus, "")))
        .expect("source");
    controller.start().expect("start");
    assert!(wait_until(|| source_connected(&controller, "a")));

    for t in [1.0, 2.0, 3.0] {
        bus.publish("alt", record("alt", t, t));
    }
    assert!(wait_until(|| {
        controller
            .source_statuses()
            .iter()
            .any(|s| s.id == "a" && s.samples_received == 3)
    }));
    bus.close();
    assert!(wait_until(|| source_stale(&controller, "a")));

    let report = controller.tick().expect("tick");
    let alt = report.batch.frame("alt").expect("alt");
    assert!(alt.stale);
    assert_eq!(alt.len(), 3);
    assert_eq!(report.ingested, 3);
}

/// Connects instantly, then blocks every read far past its timeout.
struct StalledAdapter {
    connected: bool,
    stall: Duration,
}

impl SourceAdapter for StalledAdapter {
    fn id(&self) -> &str {
        "stalled"
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Serial
    }

    fn connect(&mut self) -> FeedResult<SourceHandle> {
        self.connected = true;
        Ok(SourceHandle {
            source_id: "stalled".to_owned(),
            kind: TransportKind::Serial,
            endpoint: "nowhere".to_owned(),
        })
    }

    fn read(&mut self, _timeout: Duration) -> FeedResult<Vec<Sample>> {
        thread::sleep(self.stall);
        Ok(Vec::new())
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

#[test]
fn shutdown_detaches_a_stalled_worker_within_drain_timeout() {
    let drain = Duration::from_millis(150);
    let mut controller = LiveFeedController::new(fast_config().with_drain_timeout(drain))
        .expect("controller");
    controller
        .add_source(Box::new(StalledAdapter {
            connected: false,
            stall: Duration::from_secs(3),
        }))
        .expect("source");
    controller.start().expect("start");
    assert!(wait_until(|| source_connected(&controller, "stalled")));

    let started = Instant::now();
    controller.shutdown();
    let took = started.elapsed();

    assert!(took >= drain, "returned before the drain timeout: {took:?}");
    assert!(took < drain + Duration::from_secs(1), "shutdown took {took:?}");
    assert!(controller.is_closed());
    assert!(matches!(controller.tick(), Err(FeedError::SessionClosed)));
    assert!(controller.source_statuses().iter().all(|s| !s.connected));
}
