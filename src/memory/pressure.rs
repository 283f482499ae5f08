use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::PressureConfig;
use crate::kernel::probe::HeapProbe;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryPressure {
    Normal,
    Warning,
    Critical,
}

/// Classifies current heap usage against two thresholds.
#[derive(Debug, Clone)]
pub struct MemoryPressureClassifier {
    probe: Arc<dyn HeapProbe>,
    warning_bytes: u64,
    critical_bytes: u64,
}

impl MemoryPressureClassifier {
    pub fn new(config: &PressureConfig, probe: Arc<dyn HeapProbe>) -> Self {
        Self {
            probe,
            warning_bytes: config.warning_bytes(),
            critical_bytes: config.critical_bytes(),
        }
    }

    pub fn classify(&self, used_bytes: u64) -> MemoryPressure {
        if used_bytes >= self.critical_bytes {
            MemoryPressure::Critical
        } else if used_bytes >= self.warning_bytes {
            MemoryPressure::Warning
        } else {
            MemoryPressure::Normal
        }
    }

    pub fn check_memory_pressure(&self) -> MemoryPressure {
        self.classify(self.probe.heap_used_bytes())
    }

    pub fn should_disable_monitoring(&self) -> bool {
        self.check_memory_pressure() == MemoryPressure::Critical
    }

    /// Heap usage as a share of the critical threshold, clamped to `0.0..=1.0`.
    pub fn pressure_ratio(&self) -> f64 {
        self.ratio_of(self.probe.heap_used_bytes())
    }

    pub fn ratio_of(&self, used_bytes: u64) -> f64 {
        if self.critical_bytes == 0 {
            return 1.0;
        }
        (used_bytes as f64 / self.critical_bytes as f64).clamp(0.0, 1.0)
    }

    pub fn heap_used_bytes(&self) -> u64 {
        self.probe.heap_used_bytes()
    }

    pub fn critical_bytes(&self) -> u64 {
        self.critical_bytes
    }
}
