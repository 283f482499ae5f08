use vigil::config::{BreakerConfig, SchedulerConfig};
use vigil::{VigilConfig, VigilError};

#[test]
fn defaults_match_documented_values() {
    let config = VigilConfig::default();
    assert_eq!(config.scheduler.budget_ms, 5.0);
    assert_eq!(config.scheduler.initial_interval_ms, 5_000);
    assert_eq!(config.scheduler.min_interval_ms, 1_000);
    assert_eq!(config.scheduler.max_interval_ms, 60_000);
    assert_eq!(config.scheduler.max_queue_size, 10);
    assert_eq!(config.scheduler.queue_timeout_ms, 5_000);
    assert_eq!(config.registry.max_observations, 1_000);
    assert_eq!(config.registry.cleanup_interval_ms, 30_000);
    assert_eq!(config.pressure.warning_threshold_mb, 100);
    assert_eq!(config.pressure.critical_threshold_mb, 150);
    assert_eq!(config.performance_breaker, BreakerConfig::performance());
    assert_eq!(config.memory_breaker, BreakerConfig { failure_threshold: 5, reset_timeout_ms: 60_000 });
    config.validate().unwrap();
}

#[test]
fn partial_json_fills_in_defaults() {
    let config = VigilConfig::from_json_str(
        r#"{
            "scheduler": { "budget_ms": 2.5 },
            "memory_breaker": { "failure_threshold": 2, "reset_timeout_ms": 10000 }
        }"#,
    )
    .unwrap();

    assert_eq!(config.scheduler.budget_ms, 2.5);
    assert_eq!(config.scheduler.max_interval_ms, SchedulerConfig::default().max_interval_ms);
    assert_eq!(config.memory_breaker.failure_threshold, 2);
    assert_eq!(config.memory_breaker.reset_timeout_ms, 10_000);
    assert_eq!(config.performance_breaker, BreakerConfig::performance());
}

#[test]
fn breaker_sections_name_both_fields() {
    let err = VigilConfig::from_json_str(r#"{ "memory_breaker": { "failure_threshold": 2 } }"#).unwrap_err();
    assert!(matches!(err, VigilError::ConfigParse(_)));
}

#[test]
fn inverted_bounds_are_rejected() {
    let err = VigilConfig::from_json_str(
        r#"{ "scheduler": { "min_interval_ms": 90000, "max_interval_ms": 1000 } }"#,
    )
    .unwrap_err();
    assert!(matches!(err, VigilError::InvalidConfig(_)));

    let err = VigilConfig::from_json_str(
        r#"{ "pressure": { "warning_threshold_mb": 200, "critical_threshold_mb": 150 } }"#,
    )
    .unwrap_err();
    assert!(matches!(err, VigilError::InvalidConfig(_)));

    let err = VigilConfig::from_json_str(r#"{ "registry": { "emergency_eviction_fraction": 1.5 } }"#)
        .unwrap_err();
    assert!(matches!(err, VigilError::InvalidConfig(_)));
}

#[test]
fn malformed_json_is_a_parse_error() {
    let err = VigilConfig::from_json_str("{ not json").unwrap_err();
    assert!(matches!(err, VigilError::ConfigParse(_)));
}

#[test]
fn loads_from_disk() {
    let path = std::env::temp_dir().join(format!("vigil-{}.json", uuid::Uuid::new_v4()));
    std::fs::write(&path, r#"{ "registry": { "max_observations": 42 } }"#).unwrap();

    let config = VigilConfig::load(&path).unwrap();
    assert_eq!(config.registry.max_observations, 42);
    std::fs::remove_file(&path).unwrap();

    let err = VigilConfig::load(&path).unwrap_err();
    assert!(matches!(err, VigilError::Io(_)));
}
