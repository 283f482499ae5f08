use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::VigilError;

const MB: u64 = 1024 * 1024;

/// Top-level configuration. Every section falls back to its defaults,
/// so a partial JSON document only has to name what it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VigilConfig {
    pub scheduler: SchedulerConfig,
    pub registry: RegistryConfig,
    pub pressure: PressureConfig,
    pub load: LoadConfig,
    pub performance_breaker: BreakerConfig,
    pub memory_breaker: BreakerConfig,
}

/// A breaker section must name both fields: the two breakers have
/// different defaults, so there is no sensible per-field fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub reset_timeout_ms: u64,
}

impl BreakerConfig {
    /// Guards the collection budget.
    pub fn performance() -> Self {
        Self { failure_threshold: 3, reset_timeout_ms: 30_000 }
    }

    /// Guards the observation registry.
    pub fn memory() -> Self {
        Self { failure_threshold: 5, reset_timeout_ms: 60_000 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Maximum overhead one collection may cost.
    pub budget_ms: f64,
    pub initial_interval_ms: u64,
    pub min_interval_ms: u64,
    pub max_interval_ms: u64,
    pub min_sampling_rate: f64,
    pub max_queue_size: usize,
    pub queue_timeout_ms: u64,
    pub history_size: usize,
    /// Period of the recovery pass that relaxes degraded mode.
    pub adaptation_interval_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            budget_ms: 5.0,
            initial_interval_ms: 5_000,
            min_interval_ms: 1_000,
            max_interval_ms: 60_000,
            min_sampling_rate: 0.1,
            max_queue_size: 10,
            queue_timeout_ms: 5_000,
            history_size: 100,
            adaptation_interval_ms: 10_000,
        }
    }
}

impl SchedulerConfig {
    pub fn queue_timeout(&self) -> Duration {
        Duration::from_millis(self.queue_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), VigilError> {
        if !(self.budget_ms > 0.0) {
            return Err(VigilError::InvalidConfig("scheduler.budget_ms must be positive".into()));
        }
        if self.min_interval_ms == 0 || self.min_interval_ms > self.max_interval_ms {
            return Err(VigilError::InvalidConfig(format!(
                "scheduler interval bounds are inverted or zero: [{}, {}]",
                self.min_interval_ms, self.max_interval_ms
            )));
        }
        if !(self.min_sampling_rate > 0.0 && self.min_sampling_rate <= 1.0) {
            return Err(VigilError::InvalidConfig(
                "scheduler.min_sampling_rate must be within (0, 1]".into(),
            ));
        }
        if self.history_size == 0 {
            return Err(VigilError::InvalidConfig("scheduler.history_size must be non-zero".into()));
        }
        Ok(())
    }

    pub fn adaptation_interval(&self) -> Duration {
        Duration::from_millis(self.adaptation_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub max_observations: usize,
    pub cleanup_interval_ms: u64,
    /// Share of the set evicted, oldest first, when an add hits the cap.
    /// Zero disables emergency eviction.
    pub emergency_eviction_fraction: f64,
    /// Budget for a single leak detection pass.
    pub detection_budget_ms: f64,
    /// Live observations of one label older than this count as leak evidence.
    pub stale_observation_age_ms: u64,
    /// Minimum live instances of a label before it is reported.
    pub stale_instance_threshold: usize,
    /// Outstanding acquisitions per ledger entry before it is reported.
    pub resource_leak_threshold: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_observations: 1000,
            cleanup_interval_ms: 30_000,
            emergency_eviction_fraction: 0.5,
            detection_budget_ms: 10.0,
            stale_observation_age_ms: 300_000,
            stale_instance_threshold: 10,
            resource_leak_threshold: 50,
        }
    }
}

impl RegistryConfig {
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PressureConfig {
    pub warning_threshold_mb: u64,
    pub critical_threshold_mb: u64,
}

impl Default for PressureConfig {
    fn default() -> Self {
        Self { warning_threshold_mb: 100, critical_threshold_mb: 150 }
    }
}

impl PressureConfig {
    pub fn warning_bytes(&self) -> u64 {
        self.warning_threshold_mb * MB
    }

    pub fn critical_bytes(&self) -> u64 {
        self.critical_threshold_mb * MB
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    pub cache_ttl_ms: u64,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self { cache_ttl_ms: 5_000 }
    }
}

impl VigilConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, VigilError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, VigilError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), VigilError> {
        self.scheduler.validate()?;

        let r = &self.registry;
        if r.max_observations == 0 {
            return Err(VigilError::InvalidConfig("registry.max_observations must be non-zero".into()));
        }
        if !(0.0..=1.0).contains(&r.emergency_eviction_fraction) {
            return Err(VigilError::InvalidConfig(
                "registry.emergency_eviction_fraction must be within [0, 1]".into(),
            ));
        }
        if r.cleanup_interval_ms == 0 {
            return Err(VigilError::InvalidConfig("registry.cleanup_interval_ms must be non-zero".into()));
        }

        let p = &self.pressure;
        if p.warning_threshold_mb >= p.critical_threshold_mb {
            return Err(VigilError::InvalidConfig(format!(
                "pressure warning threshold ({}MB) must be below critical ({}MB)",
                p.warning_threshold_mb, p.critical_threshold_mb
            )));
        }

        for (name, b) in [("performance_breaker", &self.performance_breaker), ("memory_breaker", &self.memory_breaker)] {
            if b.failure_threshold == 0 {
                return Err(VigilError::InvalidConfig(format!("{name}.failure_threshold must be non-zero")));
            }
        }

        Ok(())
    }
}

impl Default for VigilConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            registry: RegistryConfig::default(),
            pressure: PressureConfig::default(),
            load: LoadConfig::default(),
            performance_breaker: BreakerConfig::performance(),
            memory_breaker: BreakerConfig::memory(),
        }
    }
}
