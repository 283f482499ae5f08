use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::load::SystemLoadSnapshot;
use crate::kernel::breaker::CircuitBreakerStatus;

/// Collection tiers, cheapest first.
///
/// Ordering follows cost: `Minimal < Critical < Full`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricsMode {
    /// Error rate, uptime and heap usage only.
    Minimal,
    /// Minimal plus latency, throughput, users, memory and critical errors.
    Critical,
    /// Everything the source can report.
    Full,
}

impl MetricsMode {
    /// One tier richer, saturating at `Full`.
    pub fn relaxed(self) -> Self {
        match self {
            MetricsMode::Minimal => MetricsMode::Critical,
            MetricsMode::Critical | MetricsMode::Full => MetricsMode::Full,
        }
    }
}

impl Default for MetricsMode {
    fn default() -> Self {
        Self::Full
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MinimalMetrics {
    /// Failed requests over all requests, `0.0..=1.0`.
    pub error_rate: f64,
    pub uptime_secs: f64,
    pub heap_used_bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryUsage {
    pub used_bytes: u64,
    pub peak_bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CriticalMetrics {
    pub response_time_ms: f64,
    pub throughput_per_sec: f64,
    pub active_users: u64,
    pub memory: MemoryUsage,
    pub critical_errors: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtendedMetrics {
    pub cpu_usage: f64,
    pub total_requests: u64,
    pub total_errors: u64,
    /// Host-defined gauges.
    pub custom: BTreeMap<String, f64>,
}

/// One best-effort snapshot. Richer sections are present only when the
/// tier that produced it covers them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsCollection {
    pub timestamp_unix_ms: u64,
    pub mode: MetricsMode,
    pub overhead_ms: f64,
    pub sampling_rate: f64,
    pub minimal: MinimalMetrics,
    pub critical: Option<CriticalMetrics>,
    pub extended: Option<ExtendedMetrics>,
}

/// Knobs the scheduler retunes after every cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveSettings {
    /// Always within `[min_interval_ms, max_interval_ms]`.
    pub current_interval_ms: u64,
    /// Always within `[min_sampling_rate, 1.0]`.
    pub sampling_rate: f64,
    /// Ceiling on the tier a collection may use.
    pub metrics_mode: MetricsMode,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverheadStats {
    pub budget_ms: f64,
    pub average_ms: f64,
    pub p95_ms: f64,
    pub max_ms: f64,
    pub samples: usize,
    pub violations: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionStats {
    pub completed: u64,
    pub failed: u64,
    pub dropped: u64,
    pub expired: u64,
    pub rejected_by_breaker: u64,
    pub skipped_by_sampling: u64,
}

/// Everything a dashboard needs to render the scheduler's health.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveMetrics {
    pub timestamp_unix_ms: u64,
    pub system_load: SystemLoadSnapshot,
    pub overhead: OverheadStats,
    pub settings: AdaptiveSettings,
    pub breaker: CircuitBreakerStatus,
    pub collections: CollectionStats,
    pub queue_depth: usize,
    pub collecting: bool,
}
