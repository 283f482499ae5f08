use std::sync::Arc;
use std::time::Duration;

use vigil::config::{LoadConfig, PressureConfig};
use vigil::kernel::{LoadReading, ManualClock, ManualProbe};
use vigil::memory::{MemoryPressure, MemoryPressureClassifier};
use vigil::monitor::{SystemLoadSampler, SystemLoadSnapshot};

fn classifier(probe: &Arc<ManualProbe>) -> MemoryPressureClassifier {
    MemoryPressureClassifier::new(&PressureConfig::default(), probe.clone())
}

#[test]
fn heap_above_critical_disables_monitoring() {
    let probe = Arc::new(ManualProbe::new());
    let c = classifier(&probe);
    probe.set_heap_mb(160);

    assert_eq!(c.check_memory_pressure(), MemoryPressure::Critical);
    assert!(c.should_disable_monitoring());
    assert!((c.pressure_ratio() - 1.0).abs() < 1e-9);
}

#[test]
fn thresholds_are_inclusive() {
    let probe = Arc::new(ManualProbe::new());
    let c = classifier(&probe);
    let mb = 1024 * 1024;

    assert_eq!(c.classify(100 * mb - 1), MemoryPressure::Normal);
    assert_eq!(c.classify(100 * mb), MemoryPressure::Warning);
    assert_eq!(c.classify(150 * mb - 1), MemoryPressure::Warning);
    assert_eq!(c.classify(150 * mb), MemoryPressure::Critical);

    probe.set_heap_mb(120);
    assert!(!c.should_disable_monitoring());
    assert!((c.pressure_ratio() - 0.8).abs() < 1e-9);
}

#[test]
fn custom_thresholds() {
    let probe = Arc::new(ManualProbe::new());
    let config = PressureConfig { warning_threshold_mb: 10, critical_threshold_mb: 20 };
    let c = MemoryPressureClassifier::new(&config, probe.clone());

    probe.set_heap_mb(15);
    assert_eq!(c.check_memory_pressure(), MemoryPressure::Warning);
    probe.set_heap_mb(20);
    assert!(c.should_disable_monitoring());
}

#[test]
fn overall_load_is_never_below_the_busiest_of_cpu_and_memory() {
    assert!((SystemLoadSnapshot::combine(0.95, 0.0, 0.0, 0.0) - 0.95).abs() < 1e-9);
    assert!((SystemLoadSnapshot::combine(0.0, 0.8, 0.0, 0.0) - 0.8).abs() < 1e-9);
    assert!((SystemLoadSnapshot::combine(0.4, 0.4, 0.8, 0.8) - 0.6).abs() < 1e-9);
    assert_eq!(SystemLoadSnapshot::combine(0.0, 0.0, 0.0, 0.0), 0.0);
}

#[test]
fn sampler_caches_for_its_ttl() {
    let probe = Arc::new(ManualProbe::new());
    let clock = Arc::new(ManualClock::new());
    let sampler = SystemLoadSampler::new(&LoadConfig::default(), probe.clone(), classifier(&probe), clock.clone());

    probe.set_load(LoadReading { cpu_usage: 0.5, network_latency: 0.1, disk_io: 0.1 });
    let first = sampler.snapshot();
    assert!((first.cpu_usage - 0.5).abs() < 1e-9);

    probe.set_uniform_load(0.9);
    clock.advance(Duration::from_millis(4_999));
    assert_eq!(sampler.snapshot(), first);
    assert_eq!(probe.sample_count(), 1);

    clock.advance(Duration::from_millis(1));
    let second = sampler.snapshot();
    assert!((second.overall_load - 0.9).abs() < 1e-9);
    assert_eq!(probe.sample_count(), 2);

    sampler.invalidate();
    sampler.snapshot();
    assert_eq!(probe.sample_count(), 3);
}

#[test]
fn sampler_clamps_out_of_range_readings() {
    let probe = Arc::new(ManualProbe::new());
    let clock = Arc::new(ManualClock::new());
    let sampler = SystemLoadSampler::new(&LoadConfig::default(), probe.clone(), classifier(&probe), clock);

    probe.set_load(LoadReading { cpu_usage: 3.0, network_latency: -1.0, disk_io: 0.0 });
    probe.set_heap_mb(500);
    let snapshot = sampler.refresh();
    assert_eq!(snapshot.cpu_usage, 1.0);
    assert_eq!(snapshot.network_latency, 0.0);
    assert_eq!(snapshot.memory_pressure, 1.0);
    assert_eq!(snapshot.memory_level, MemoryPressure::Critical);
    assert_eq!(snapshot.overall_load, 1.0);
}
