use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::types::{ComponentLeak, FixSuggestion, LeakCategory, LeakSeverity, ObservationSummary};

/// What a detector gets to look at. Never the observed objects themselves.
#[derive(Debug)]
pub struct DetectionContext<'a> {
    pub observations: &'a [ObservationSummary],
    pub now_unix_ms: u64,
}

pub trait LeakDetector: Send + Sync + Debug {
    fn category(&self) -> LeakCategory;
    fn detect(&self, ctx: &DetectionContext<'_>) -> Vec<ComponentLeak>;
}

/// Flags labels with many live observations that have outlived `max_age`.
#[derive(Debug, Clone)]
pub struct StaleObservationDetector {
    max_age: Duration,
    min_instances: usize,
}

impl StaleObservationDetector {
    pub fn new(max_age: Duration, min_instances: usize) -> Self {
        Self {
            max_age,
            min_instances: min_instances.max(1),
        }
    }
}

impl LeakDetector for StaleObservationDetector {
    fn category(&self) -> LeakCategory {
        LeakCategory::Component
    }

    fn detect(&self, ctx: &DetectionContext<'_>) -> Vec<ComponentLeak> {
        ctx.observations
            .iter()
            .filter(|s| s.live >= self.min_instances && s.oldest_age >= self.max_age)
            .map(|s| ComponentLeak {
                category: LeakCategory::Component,
                name: s.label.clone(),
                instances: s.live,
                estimated_bytes: s.estimated_bytes,
                severity: LeakSeverity::grade(s.live as u64, self.min_instances as u64),
                oldest_age_ms: Some(s.oldest_age.as_millis() as u64),
            })
            .collect()
    }
}

/// Outstanding acquisitions per (category, name).
///
/// The host calls `acquire` when it registers a listener, starts a timer or
/// caches a node, and `release` when it tears it down. Whatever never comes
/// back shows up here.
#[derive(Debug, Default)]
pub struct ResourceLedger {
    outstanding: Mutex<HashMap<(LeakCategory, String), u64>>,
}

impl ResourceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self, category: LeakCategory, name: impl Into<String>) {
        *self.outstanding.lock().entry((category, name.into())).or_insert(0) += 1;
    }

    /// Releasing more than was acquired is a no-op.
    pub fn release(&self, category: LeakCategory, name: &str) {
        let mut outstanding = self.outstanding.lock();
        let key = (category, name.to_string());
        if let Some(count) = outstanding.get_mut(&key) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                outstanding.remove(&key);
            }
        }
    }

    pub fn outstanding(&self, category: LeakCategory, name: &str) -> u64 {
        self.outstanding
            .lock()
            .get(&(category, name.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Sorted by name.
    pub fn entries(&self, category: LeakCategory) -> Vec<(String, u64)> {
        let mut entries: Vec<(String, u64)> = self
            .outstanding
            .lock()
            .iter()
            .filter(|((c, _), _)| *c == category)
            .map(|((_, name), count)| (name.clone(), *count))
            .collect();
        entries.sort();
        entries
    }

    pub fn clear(&self) {
        self.outstanding.lock().clear();
    }
}

/// Reports ledger entries of one category above `threshold`.
#[derive(Debug, Clone)]
pub struct LedgerLeakDetector {
    ledger: Arc<ResourceLedger>,
    category: LeakCategory,
    threshold: u64,
    bytes_per_item: u64,
}

impl LedgerLeakDetector {
    pub fn new(ledger: Arc<ResourceLedger>, category: LeakCategory, threshold: u64) -> Self {
        Self {
            ledger,
            category,
            threshold: threshold.max(1),
            bytes_per_item: estimated_item_bytes(category),
        }
    }
}

impl LeakDetector for LedgerLeakDetector {
    fn category(&self) -> LeakCategory {
        self.category
    }

    fn detect(&self, _ctx: &DetectionContext<'_>) -> Vec<ComponentLeak> {
        self.ledger
            .entries(self.category)
            .into_iter()
            .filter(|(_, count)| *count > self.threshold)
            .map(|(name, count)| ComponentLeak {
                category: self.category,
                name,
                instances: count as usize,
                estimated_bytes: count * self.bytes_per_item,
                severity: LeakSeverity::grade(count, self.threshold),
                oldest_age_ms: None,
            })
            .collect()
    }
}

// Rough per-item cost, only used to rank findings.
fn estimated_item_bytes(category: LeakCategory) -> u64 {
    match category {
        LeakCategory::Component => 1024,
        LeakCategory::EventListener => 256,
        LeakCategory::Timer => 128,
        LeakCategory::DomNode => 512,
    }
}

/// One detector per category, sharing `ledger`.
pub fn default_detectors(
    ledger: &Arc<ResourceLedger>,
    stale_age: Duration,
    stale_instances: usize,
    resource_threshold: u64,
) -> Vec<Box<dyn LeakDetector>> {
    vec![
        Box::new(StaleObservationDetector::new(stale_age, stale_instances)),
        Box::new(LedgerLeakDetector::new(
            Arc::clone(ledger),
            LeakCategory::EventListener,
            resource_threshold,
        )),
        Box::new(LedgerLeakDetector::new(
            Arc::clone(ledger),
            LeakCategory::Timer,
            resource_threshold,
        )),
        Box::new(LedgerLeakDetector::new(
            Arc::clone(ledger),
            LeakCategory::DomNode,
            resource_threshold,
        )),
    ]
}

pub fn suggest_fix(leak: &ComponentLeak) -> FixSuggestion {
    let action = match leak.category {
        LeakCategory::Component => format!(
            "Drop references to `{}` once it is unmounted; {} instances are still reachable",
            leak.name, leak.instances
        ),
        LeakCategory::EventListener => format!(
            "Remove `{}` listeners on teardown; {} registrations are outstanding",
            leak.name, leak.instances
        ),
        LeakCategory::Timer => format!(
            "Cancel `{}` timers when their owner goes away; {} are still scheduled",
            leak.name, leak.instances
        ),
        LeakCategory::DomNode => format!(
            "Evict detached `{}` nodes from caches; {} are retained",
            leak.name, leak.instances
        ),
    };
    FixSuggestion {
        category: leak.category,
        name: leak.name.clone(),
        action,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_release_never_underflows() {
        let ledger = ResourceLedger::new();
        ledger.release(LeakCategory::Timer, "poll");
        ledger.acquire(LeakCategory::Timer, "poll");
        ledger.release(LeakCategory::Timer, "poll");
        ledger.release(LeakCategory::Timer, "poll");
        assert_eq!(ledger.outstanding(LeakCategory::Timer, "poll"), 0);
        assert!(ledger.entries(LeakCategory::Timer).is_empty());
    }

    #[test]
    fn severity_scales_with_overshoot() {
        assert_eq!(LeakSeverity::grade(11, 10), LeakSeverity::Low);
        assert_eq!(LeakSeverity::grade(25, 10), LeakSeverity::Medium);
        assert_eq!(LeakSeverity::grade(40, 10), LeakSeverity::High);
    }

    #[test]
    fn stale_detector_ignores_young_labels() {
        let summaries = vec![
            ObservationSummary {
                label: "young".into(),
                live: 50,
                oldest_age: Duration::from_secs(1),
                estimated_bytes: 0,
            },
            ObservationSummary {
                label: "old".into(),
                live: 12,
                oldest_age: Duration::from_secs(600),
                estimated_bytes: 96,
            },
        ];
        let detector = StaleObservationDetector::new(Duration::from_secs(300), 10);
        let leaks = detector.detect(&DetectionContext {
            observations: &summaries,
            now_unix_ms: 0,
        });
        assert_eq!(leaks.len(), 1);
        assert_eq!(leaks[0].name, "old");
        assert_eq!(leaks[0].oldest_age_ms, Some(600_000));
    }
}
