use std::sync::Arc;
use std::time::Duration;

use vigil::kernel::{ManualClock, ManualProbe};
use vigil::monitor::{MetricsSource, ProcessMetricsSource};

fn rig() -> (ProcessMetricsSource, Arc<ManualClock>, Arc<ManualProbe>) {
    let clock = Arc::new(ManualClock::new());
    let probe = Arc::new(ManualProbe::new());
    let source = ProcessMetricsSource::new(clock.clone(), probe.clone(), probe.clone());
    (source, clock, probe)
}

#[tokio::test]
async fn fresh_source_reports_zeroes() {
    let (source, _, _) = rig();

    let minimal = source.minimal().await.unwrap();
    assert_eq!(minimal.error_rate, 0.0);
    assert_eq!(minimal.uptime_secs, 0.0);
    assert_eq!(minimal.heap_used_bytes, 0);

    // No requests and no uptime yet: both ratios fall back to zero.
    let critical = source.critical().await.unwrap();
    assert_eq!(critical.response_time_ms, 0.0);
    assert_eq!(critical.throughput_per_sec, 0.0);
    assert!(critical.response_time_ms.is_finite() && critical.throughput_per_sec.is_finite());

    let extended = source.extended().await.unwrap();
    assert_eq!(extended.total_requests, 0);
    assert_eq!(extended.total_errors, 0);
    assert!(extended.custom.is_empty());
}

#[tokio::test]
async fn request_counters_drive_rates() {
    let (source, clock, _) = rig();
    for _ in 0..3 {
        source.record_request(Duration::from_millis(10), true);
    }
    source.record_request(Duration::from_millis(30), false);

    // Throughput stays zero until some uptime has accrued.
    assert_eq!(source.critical().await.unwrap().throughput_per_sec, 0.0);

    clock.advance(Duration::from_secs(2));

    let minimal = source.minimal().await.unwrap();
    assert_eq!(minimal.error_rate, 0.25);
    assert_eq!(minimal.uptime_secs, 2.0);

    let critical = source.critical().await.unwrap();
    assert_eq!(critical.response_time_ms, 15.0);
    assert_eq!(critical.throughput_per_sec, 2.0);

    let extended = source.extended().await.unwrap();
    assert_eq!(extended.total_requests, 4);
    assert_eq!(extended.total_errors, 1);
}

#[tokio::test]
async fn heap_peak_survives_a_drop_in_usage() {
    let (source, _, probe) = rig();

    probe.set_heap_mb(50);
    assert_eq!(source.minimal().await.unwrap().heap_used_bytes, 50 * 1024 * 1024);

    probe.set_heap_mb(20);
    let critical = source.critical().await.unwrap();
    assert_eq!(critical.memory.used_bytes, 20 * 1024 * 1024);
    assert_eq!(critical.memory.peak_bytes, 50 * 1024 * 1024);
}

#[tokio::test]
async fn host_supplied_figures_are_reported_as_set() {
    let (source, _, probe) = rig();
    source.set_active_users(42);
    source.record_critical_error();
    source.record_critical_error();
    source.set_gauge("cache_hit_ratio", 0.75);
    source.set_gauge("cache_hit_ratio", 0.8);
    source.set_gauge("open_sessions", 12.0);
    probe.set_uniform_load(0.4);

    let critical = source.critical().await.unwrap();
    assert_eq!(critical.active_users, 42);
    assert_eq!(critical.critical_errors, 2);

    let extended = source.extended().await.unwrap();
    assert_eq!(extended.cpu_usage, 0.4);
    assert_eq!(extended.custom.len(), 2);
    assert_eq!(extended.custom["cache_hit_ratio"], 0.8);
    assert_eq!(extended.custom["open_sessions"], 12.0);

    source.set_active_users(3);
    assert_eq!(source.critical().await.unwrap().active_users, 3);
}
