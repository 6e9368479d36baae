use std::time::Duration;

use telemetry_feed::source::{LocalBus, PubSubAdapter, SourceAdapter, TransportKind};

const TIMEOUT: Duration = Duration::from_millis(50);

fn record(channel: &str, value: f64, t: f64) -> String {
    format!(r#"{{"channel_id":"{channel}","value":{value},"timestamp":{t}}}"#)
}

#[test]
fn delivers_published_records() {
    let bus = LocalBus::new();
    let mut adapter = PubSubAdapter::local("hub", &bus, "telemetry");

    let handle = adapter.connect().expect("connect");
    assert_eq!(handle.kind, TransportKind::PubSub);
    assert_eq!(bus.subscriber_count(), 1);

    assert_eq!(bus.publish("telemetry/alt", record("alt", 12.0, 1.0)), 1);
    let samples = adapter.read(TIMEOUT).expect("read");
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].channel_id().as_str(), "alt");
}

#[test]
fn topic_filter_is_a_prefix_match() {
    let bus = LocalBus::new();
    let mut adapter = PubSubAdapter::local("hub", &bus, "telemetry");
    adapter.connect().expect("connect");

    assert_eq!(bus.publish("status", record("alt", 1.0, 1.0)), 0);
    assert!(adapter.read(TIMEOUT).expect("timeout").is_empty());
}

#[test]
fn malformed_message_is_skipped() {
    let bus = LocalBus::new();
    let mut adapter = PubSubAdapter::local("hub", &bus, "");
    adapter.connect().expect("connect");

    bus.publish("t", "not json at all");
    bus.publish("t", record("alt", 2.0, 2.0));

    assert!(adapter.read(TIMEOUT).expect_err("bad message").is_parse());
    let samples = adapter.read(TIMEOUT).expect("next message");
    assert_eq!(samples.len(), 1);
    assert!(adapter.is_connected());
}

#[test]
fn closing_the_bus_disconnects_subscribers() {
    let bus = LocalBus::new();
    let mut adapter = PubSubAdapter::local("hub", &bus, "");
    adapter.connect().expect("connect");

    bus.close();
    assert!(bus.is_closed());
    assert!(adapter.read(TIMEOUT).expect_err("bus closed").is_connection());
    assert!(!adapter.is_connected());
    assert!(adapter.connect().expect_err("closed bus refuses").is_connection());

    bus.reopen();
    adapter.connect().expect("reconnect after reopen");
    bus.publish("t", record("alt", 3.0, 3.0));
    assert_eq!(adapter.read(TIMEOUT).expect("read").len(), 1);
}

#[test]
fn publish_json_serializes_messages() {
    #[derive(serde::Serialize)]
    struct Bundle {
        ts: f64,
        telemetry: std::collections::BTreeMap<&'static str, f64>,
    }

    let bus = LocalBus::new();
    let mut adapter = PubSubAdapter::local("hub", &bus, "");
    adapter.connect().expect("connect");

    let bundle = Bundle {
        ts: 10.0,
        telemetry: [("temperature", 21.0), ("pressure", 1013.2)]
            .into_iter()
            .collect(),
    };
    assert_eq!(bus.publish_json("sensors", &bundle).expect("publish"), 1);
    assert_eq!(adapter.read(TIMEOUT).expect("read").len(), 2);
}

#[test]
fn disconnect_is_idempotent() {
    let bus = LocalBus::new();
    let mut adapter = PubSubAdapter::local("hub", &bus, "");
    adapter.disconnect();
    adapter.connect().expect("connect");
    adapter.disconnect();
    adapter.disconnect();
    assert!(!adapter.is_connected());
    assert_eq!(bus.publish("t", "{}"), 0, "dropped subscriber is pruned");
}
