mod common;

use std::sync::Arc;
use std::time::Duration;

use common::registry;
use vigil::config::RegistryConfig;
use vigil::kernel::telemetry::TelemetryRecorder;
use vigil::kernel::{CircuitState, Clock, ManualClock, ManualProbe, TokioClock};
use vigil::memory::detectors::DetectionContext;
use vigil::memory::{ComponentLeak, LeakCategory, LeakDetector, LeakSeverity, MemoryPressure};

struct Widget {
    _id: usize,
}

/// Reports every label with at least `min_live` live observations as
/// retained nodes.
#[derive(Debug)]
struct RetainedNodeDetector {
    min_live: usize,
}

impl LeakDetector for RetainedNodeDetector {
    fn category(&self) -> LeakCategory {
        LeakCategory::DomNode
    }

    fn detect(&self, ctx: &DetectionContext<'_>) -> Vec<ComponentLeak> {
        ctx.observations
            .iter()
            .filter(|s| s.live >= self.min_live)
            .map(|s| ComponentLeak {
                category: LeakCategory::DomNode,
                name: s.label.clone(),
                instances: s.live,
                estimated_bytes: s.estimated_bytes,
                severity: LeakSeverity::Medium,
                oldest_age_ms: None,
            })
            .collect()
    }
}

fn rig(config: RegistryConfig) -> (Arc<vigil::ObservationRegistry>, Arc<ManualClock>, Arc<ManualProbe>, Arc<TelemetryRecorder>) {
    let clock = Arc::new(ManualClock::new());
    let probe = Arc::new(ManualProbe::new());
    let recorder = Arc::new(TelemetryRecorder::new());
    let r = registry(config, clock.clone(), &probe, &recorder);
    (r, clock, probe, recorder)
}

#[test]
fn overflow_evicts_oldest_half_and_keeps_the_cap() {
    let (r, _, _, recorder) = rig(RegistryConfig::default());
    let widgets: Vec<Arc<Widget>> = (0..1100).map(|i| Arc::new(Widget { _id: i })).collect();

    for w in &widgets {
        assert!(r.observe("Widget", w));
        assert!(r.observation_count() <= 1000);
    }

    // One eviction of 500 at the 1001st add.
    assert_eq!(r.observation_count(), 600);
    assert_eq!(recorder.count("emergency_cleanup"), 1);
    assert_eq!(recorder.snapshot().registry_stats.evicted, 500);
    assert_eq!(r.breaker_status().state, CircuitState::Closed);
}

#[test]
fn without_eviction_overflow_is_rejected_and_trips_the_breaker() {
    let config = RegistryConfig {
        emergency_eviction_fraction: 0.0,
        ..RegistryConfig::default()
    };
    let (r, _, _, recorder) = rig(config);
    let widgets: Vec<Arc<Widget>> = (0..1100).map(|i| Arc::new(Widget { _id: i })).collect();

    let accepted = widgets.iter().filter(|w| r.observe("Widget", w)).count();

    assert_eq!(accepted, 1000);
    assert_eq!(r.observation_count(), 1000);
    assert_eq!(r.breaker_status().state, CircuitState::Open);

    let stats = recorder.snapshot().registry_stats;
    assert_eq!(stats.rejected_capacity, 5);
    assert_eq!(stats.rejected_circuit_open, 95);
    assert_eq!(recorder.count("circuit_breaker_opened"), 1);
}

#[test]
fn observing_never_extends_lifetime() {
    let (r, _, _, _) = rig(RegistryConfig::default());
    let widget = Arc::new(Widget { _id: 1 });

    assert!(r.observe("Widget", &widget));
    assert_eq!(Arc::strong_count(&widget), 1);
    assert_eq!(r.live_count(), 1);

    drop(widget);
    assert_eq!(r.live_count(), 0);
    assert_eq!(r.observation_count(), 1);
}

#[test]
fn cleanup_removes_dead_observations() {
    let (r, clock, _, recorder) = rig(RegistryConfig::default());
    let mut widgets: Vec<Arc<Widget>> = (0..10).map(|i| Arc::new(Widget { _id: i })).collect();
    for w in &widgets {
        r.observe("Widget", w);
    }
    widgets.truncate(6);

    let outcome = r.cleanup_now();
    assert_eq!(outcome.items_cleaned, 4);
    assert!(outcome.memory_released > 0);
    assert_eq!(r.observation_count(), 6);

    let stats = r.cleanup_stats();
    assert_eq!(stats.cycles, 1);
    assert_eq!(stats.items_cleaned, 4);
    let last = stats.last_cleanup_unix_ms.unwrap();
    assert_eq!(stats.next_cleanup_unix_ms, Some(last + 30_000));

    clock.advance(Duration::from_secs(30));
    assert_eq!(r.cleanup_now().items_cleaned, 0);
    assert_eq!(r.cleanup_stats().cycles, 2);
    assert_eq!(recorder.count("cleanup_completed"), 2);
}

#[test]
fn critical_pressure_refuses_without_counting_failures() {
    let (r, _, probe, recorder) = rig(RegistryConfig::default());
    probe.set_heap_mb(160);
    let widget = Arc::new(Widget { _id: 1 });

    assert_eq!(r.memory_pressure(), MemoryPressure::Critical);
    assert!(!r.observe("Widget", &widget));
    assert_eq!(r.observation_count(), 0);
    assert_eq!(r.breaker_status().failure_count, 0);
    assert_eq!(recorder.snapshot().registry_stats.rejected_pressure, 1);
}

#[test]
fn long_lived_observations_are_reported_as_component_leaks() {
    let (r, clock, _, recorder) = rig(RegistryConfig::default());
    let panels: Vec<Arc<Widget>> = (0..12).map(|i| Arc::new(Widget { _id: i })).collect();
    for p in &panels {
        r.observe("SettingsPanel", p);
    }
    let fresh = Arc::new(Widget { _id: 99 });

    clock.advance(Duration::from_secs(301));
    r.observe("Toast", &fresh);

    let report = r.detect_leaks();
    assert!(!report.from_cache);
    assert_eq!(report.total_leaks, 1);
    assert_eq!(report.observations, 13);

    let leak = &report.leaks[0];
    assert_eq!(leak.category, LeakCategory::Component);
    assert_eq!(leak.name, "SettingsPanel");
    assert_eq!(leak.instances, 12);
    assert_eq!(leak.severity, LeakSeverity::Low);
    assert!(leak.oldest_age_ms.unwrap() >= 301_000);
    assert_eq!(report.suggestions.len(), 1);
    assert!(report.suggestions[0].action.contains("SettingsPanel"));

    assert_eq!(recorder.count("memory_leak_detected"), 1);
    assert_eq!(r.detection_stats().samples, 1);
}

#[test]
fn ledger_imbalance_is_reported_per_category() {
    let (r, _, _, _) = rig(RegistryConfig::default());
    for _ in 0..60 {
        r.ledger().acquire(LeakCategory::EventListener, "resize");
    }
    for _ in 0..250 {
        r.ledger().acquire(LeakCategory::Timer, "poll");
    }
    for _ in 0..40 {
        r.ledger().acquire(LeakCategory::DomNode, "row");
    }

    let report = r.detect_leaks();
    assert_eq!(report.total_leaks, 2);

    let listener = report.by_category(LeakCategory::EventListener).next().unwrap();
    assert_eq!(listener.instances, 60);
    assert_eq!(listener.severity, LeakSeverity::Low);

    let timer = report.by_category(LeakCategory::Timer).next().unwrap();
    assert_eq!(timer.severity, LeakSeverity::High);
    assert!(report.by_category(LeakCategory::DomNode).next().is_none());

    for _ in 0..60 {
        r.ledger().release(LeakCategory::EventListener, "resize");
    }
    assert_eq!(r.detect_leaks().by_category(LeakCategory::EventListener).count(), 0);
}

#[test]
fn detection_falls_back_to_cached_report() {
    let (r, _, probe, _) = rig(RegistryConfig::default());

    probe.set_heap_mb(160);
    let empty = r.detect_leaks();
    assert!(empty.from_cache);
    assert_eq!(empty.total_leaks, 0);

    probe.set_heap_mb(10);
    let fresh = r.detect_leaks();
    assert!(!fresh.from_cache);

    probe.set_heap_mb(160);
    let cached = r.detect_leaks();
    assert!(cached.from_cache);
    assert_eq!(cached.id, fresh.id);
}

#[test]
fn destroy_twice_leaves_an_empty_inert_registry() {
    let (r, _, _, _) = rig(RegistryConfig::default());
    let widgets: Vec<Arc<Widget>> = (0..5).map(|i| Arc::new(Widget { _id: i })).collect();
    for w in &widgets {
        r.observe("Widget", w);
    }

    r.destroy();
    assert_eq!(r.observation_count(), 0);
    r.destroy();
    assert_eq!(r.observation_count(), 0);
    assert_eq!(r.active_timers(), 0);
    assert!(r.is_destroyed());

    assert!(!r.observe("Widget", &widgets[0]));
    assert_eq!(r.cleanup_now().items_cleaned, 0);
}

#[tokio::test(start_paused = true)]
async fn cleanup_cycle_runs_on_its_timer() {
    let clock: Arc<dyn Clock> = Arc::new(TokioClock);
    let probe = Arc::new(ManualProbe::new());
    let recorder = Arc::new(TelemetryRecorder::new());
    let r = registry(RegistryConfig::default(), clock, &probe, &recorder);

    let mut widgets: Vec<Arc<Widget>> = (0..8).map(|i| Arc::new(Widget { _id: i })).collect();
    for w in &widgets {
        r.observe("Widget", w);
    }
    widgets.truncate(3);

    r.start();
    assert_eq!(r.active_timers(), 1);

    tokio::time::sleep(Duration::from_secs(29)).await;
    assert_eq!(r.cleanup_stats().cycles, 0);

    tokio::time::sleep(Duration::from_secs(2)).await;
    let stats = r.cleanup_stats();
    assert_eq!(stats.cycles, 1);
    assert_eq!(stats.items_cleaned, 5);
    assert_eq!(r.observation_count(), 3);

    r.destroy();
    assert_eq!(r.active_timers(), 0);
}

#[test]
fn added_detector_joins_the_detection_pass() {
    let (r, _, _, recorder) = rig(RegistryConfig::default());
    let rows: Vec<Arc<Widget>> = (0..3).map(|i| Arc::new(Widget { _id: i })).collect();
    for row in &rows {
        r.observe("TableRow", row);
    }
    let header = Arc::new(Widget { _id: 10 });
    r.observe("Header", &header);

    assert_eq!(r.detect_leaks().total_leaks, 0);

    r.add_detector(Box::new(RetainedNodeDetector { min_live: 2 }));
    let report = r.detect_leaks();
    assert_eq!(report.total_leaks, 1);

    let leak = report.by_category(LeakCategory::DomNode).next().unwrap();
    assert_eq!(leak.name, "TableRow");
    assert_eq!(leak.instances, 3);
    assert_eq!(leak.severity, LeakSeverity::Medium);

    assert_eq!(report.suggestions.len(), 1);
    assert_eq!(report.suggestions[0].category, LeakCategory::DomNode);
    assert!(report.suggestions[0].action.contains("TableRow"));
    assert_eq!(recorder.count("memory_leak_detected"), 1);
}
