use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::pressure::MemoryPressure;
use crate::kernel::cleanup::CleanupStats;

/// Where leak evidence comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LeakCategory {
    /// Observed objects that outlive their expected lifetime.
    Component,
    EventListener,
    Timer,
    /// Detached nodes still held by caches.
    DomNode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeakSeverity {
    Low,
    Medium,
    High,
}

impl LeakSeverity {
    /// Grades a finding by how far it overshoots its threshold.
    pub fn grade(instances: u64, threshold: u64) -> Self {
        let threshold = threshold.max(1);
        if instances >= threshold * 4 {
            LeakSeverity::High
        } else if instances >= threshold * 2 {
            LeakSeverity::Medium
        } else {
            LeakSeverity::Low
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentLeak {
    pub category: LeakCategory,
    pub name: String,
    pub instances: usize,
    pub estimated_bytes: u64,
    pub severity: LeakSeverity,
    /// Age of the oldest live instance, when known.
    pub oldest_age_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixSuggestion {
    pub category: LeakCategory,
    pub name: String,
    pub action: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemorySummary {
    pub heap_used_bytes: u64,
    pub pressure: MemoryPressure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryLeakReport {
    pub id: Uuid,
    pub generated_at_unix_ms: u64,
    pub total_leaks: usize,
    pub leaks: Vec<ComponentLeak>,
    pub suggestions: Vec<FixSuggestion>,
    pub memory: MemorySummary,
    /// Observations held when the report was built.
    pub observations: usize,
    pub cleanup: CleanupStats,
    pub detection_ms: f64,
    /// Set when detection was skipped and a previous report was served.
    pub from_cache: bool,
}

impl MemoryLeakReport {
    pub fn empty(generated_at_unix_ms: u64, memory: MemorySummary, cleanup: CleanupStats) -> Self {
        Self {
            id: Uuid::new_v4(),
            generated_at_unix_ms,
            total_leaks: 0,
            leaks: Vec::new(),
            suggestions: Vec::new(),
            memory,
            observations: 0,
            cleanup,
            detection_ms: 0.0,
            from_cache: false,
        }
    }

    pub fn has_leaks(&self) -> bool {
        self.total_leaks > 0
    }

    pub fn by_category(&self, category: LeakCategory) -> impl Iterator<Item = &ComponentLeak> {
        self.leaks.iter().filter(move |l| l.category == category)
    }
}

/// Live observations of one label, as seen by detectors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservationSummary {
    pub label: String,
    pub live: usize,
    pub oldest_age: Duration,
    pub estimated_bytes: u64,
}
