use std::collections::VecDeque;

use serde::Serialize;

use super::event::{RejectionReason, TelemetryEvent};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TelemetrySnapshot {
    pub budget_stats: BudgetStats,
    pub mode_stats: ModeStats,
    pub queue_stats: QueueStats,
    pub breaker_trips: u64,
    pub leak_stats: LeakStats,
    pub registry_stats: RegistryStats,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BudgetStats {
    pub violations: u64,
    pub total_excess_ms: f64,
    pub avg_excess_ms: f64,
    pub worst_overhead_ms: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModeStats {
    pub degradations: u64,
    pub recoveries: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueueStats {
    pub dropped: u64,
    pub expired: u64,
    pub total_wait_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LeakStats {
    pub findings: u64,
    pub instances: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RegistryStats {
    pub emergency_cleanups: u64,
    pub evicted: u64,
    pub cleanups: u64,
    pub items_cleaned: u64,
    pub rejected_circuit_open: u64,
    pub rejected_pressure: u64,
    pub rejected_capacity: u64,
}

pub fn compute_snapshot(events: &VecDeque<TelemetryEvent>) -> TelemetrySnapshot {
    let mut snap = TelemetrySnapshot::default();

    for event in events {
        match event {
            TelemetryEvent::BudgetViolation { overhead_ms, budget_ms, .. } => {
                snap.budget_stats.violations += 1;
                snap.budget_stats.total_excess_ms += (overhead_ms - budget_ms).max(0.0);
                if *overhead_ms > snap.budget_stats.worst_overhead_ms {
                    snap.budget_stats.worst_overhead_ms = *overhead_ms;
                }
            }
            TelemetryEvent::DegradedModeEntered { .. } => snap.mode_stats.degradations += 1,
            TelemetryEvent::ModeRecovered { .. } => snap.mode_stats.recoveries += 1,
            TelemetryEvent::CollectionDropped { .. } => snap.queue_stats.dropped += 1,
            TelemetryEvent::RequestExpired { waited_ms } => {
                snap.queue_stats.expired += 1;
                snap.queue_stats.total_wait_ms += waited_ms;
            }
            TelemetryEvent::BreakerOpened { .. } => snap.breaker_trips += 1,
            TelemetryEvent::LeakDetected { instances, .. } => {
                snap.leak_stats.findings += 1;
                snap.leak_stats.instances += *instances as u64;
            }
            TelemetryEvent::EmergencyCleanup { evicted, .. } => {
                snap.registry_stats.emergency_cleanups += 1;
                snap.registry_stats.evicted += *evicted as u64;
            }
            TelemetryEvent::ObservationRejected { reason } => match reason {
                RejectionReason::CircuitOpen => snap.registry_stats.rejected_circuit_open += 1,
                RejectionReason::MemoryPressure => snap.registry_stats.rejected_pressure += 1,
                RejectionReason::CapacityExceeded => snap.registry_stats.rejected_capacity += 1,
                RejectionReason::Destroyed => {}
            },
            TelemetryEvent::CleanupCompleted { items_cleaned, .. } => {
                snap.registry_stats.cleanups += 1;
                snap.registry_stats.items_cleaned += *items_cleaned as u64;
            }
        }
    }

    if snap.budget_stats.violations > 0 {
        snap.budget_stats.avg_excess_ms =
            snap.budget_stats.total_excess_ms / snap.budget_stats.violations as f64;
    }

    snap
}
