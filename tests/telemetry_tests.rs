use telemetry_feed::telemetry::{DEFAULT_FILTER, init_default_tracing, init_tracing_with_filter};

#[test]
fn tracing_installs_at_most_once() {
    let first = init_tracing_with_filter("telemetry_feed=debug");
    let second = init_default_tracing();

    assert_eq!(DEFAULT_FILTER, "info");
    assert!(!second, "a global subscriber can only be installed once");
    if cfg!(feature = "telemetry") {
        assert!(first);
    } else {
        assert!(!first);
    }
}
