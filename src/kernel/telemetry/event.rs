use serde::{Deserialize, Serialize};

use crate::memory::types::{LeakCategory, LeakSeverity};
use crate::monitor::types::MetricsMode;

// Allowed: labels, timestamps, durations, counts, enums
// Forbidden: observed objects or anything derived from their contents

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TelemetryEvent {
    BudgetViolation {
        overhead_ms: f64,
        budget_ms: f64,
        mode: MetricsMode,
    },

    DegradedModeEntered {
        interval_ms: u64,
        sampling_rate: f64,
    },

    ModeRecovered {
        from: MetricsMode,
        to: MetricsMode,
    },

    CollectionDropped {
        queue_depth: usize,
    },

    RequestExpired {
        waited_ms: u64,
    },

    BreakerOpened {
        breaker: String,
        failures: u32,
    },

    LeakDetected {
        category: LeakCategory,
        name: String,
        instances: usize,
        severity: LeakSeverity,
    },

    EmergencyCleanup {
        evicted: usize,
        remaining: usize,
    },

    ObservationRejected {
        reason: RejectionReason,
    },

    CleanupCompleted {
        items_cleaned: usize,
        memory_released: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RejectionReason {
    CircuitOpen,
    MemoryPressure,
    CapacityExceeded,
    Destroyed,
}

impl TelemetryEvent {
    /// Stable event name for sinks that key on strings.
    pub fn name(&self) -> &'static str {
        match self {
            TelemetryEvent::BudgetViolation { .. } => "performance_budget_violation",
            TelemetryEvent::DegradedModeEntered { .. } => "degraded_mode_entered",
            TelemetryEvent::ModeRecovered { .. } => "metrics_mode_recovered",
            TelemetryEvent::CollectionDropped { .. } => "collection_dropped",
            TelemetryEvent::RequestExpired { .. } => "collection_request_expired",
            TelemetryEvent::BreakerOpened { .. } => "circuit_breaker_opened",
            TelemetryEvent::LeakDetected { .. } => "memory_leak_detected",
            TelemetryEvent::EmergencyCleanup { .. } => "emergency_cleanup",
            TelemetryEvent::ObservationRejected { .. } => "observation_rejected",
            TelemetryEvent::CleanupCompleted { .. } => "cleanup_completed",
        }
    }
}
