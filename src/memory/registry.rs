use std::any::Any;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::detectors::{default_detectors, suggest_fix, DetectionContext, LeakDetector, ResourceLedger};
use super::pressure::{MemoryPressure, MemoryPressureClassifier};
use super::types::{ComponentLeak, MemoryLeakReport, MemorySummary, ObservationSummary};
use crate::config::RegistryConfig;
use crate::kernel::breaker::{CircuitBreaker, CircuitBreakerStatus};
use crate::kernel::cleanup::{CleanupCycle, CleanupStats, Sweep, SweepOutcome};
use crate::kernel::telemetry::{AnalyticsSink, RejectionReason, TelemetryEvent};
use crate::kernel::time::{as_millis_f64, Clock};
use crate::kernel::timers::TimerSet;
use crate::monitor::budget::{PerformanceBudgetTracker, PerformanceSample};
use crate::monitor::types::OverheadStats;

const DETECTION_HISTORY: usize = 50;
const SHRINK_MIN_CAPACITY: usize = 64;

/// A non-owning handle on something the host owns.
struct Observation {
    id: Uuid,
    label: String,
    target: Weak<dyn Any + Send + Sync>,
    inserted_at: Instant,
    size_hint: usize,
}

impl Observation {
    fn is_alive(&self) -> bool {
        self.target.strong_count() > 0
    }

    /// Bookkeeping this entry costs us, not the size of its referent.
    fn footprint(&self) -> u64 {
        (std::mem::size_of::<Observation>() + self.label.capacity()) as u64
    }
}

impl std::fmt::Debug for Observation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observation")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("alive", &self.is_alive())
            .finish()
    }
}

#[derive(Debug)]
struct RegistryState {
    observations: VecDeque<Observation>,
    cleanup: CleanupStats,
    last_report: Option<MemoryLeakReport>,
    destroyed: bool,
}

pub struct RegistryDeps {
    pub clock: Arc<dyn Clock>,
    pub classifier: MemoryPressureClassifier,
    pub breaker: CircuitBreaker,
    pub analytics: Arc<dyn AnalyticsSink>,
}

/// Bounded set of weak observations plus leak detection over them.
///
/// The registry never keeps an observed object alive: dead entries are
/// swept on a timer, and when the set is full the oldest share is evicted
/// outright. Admission and detection sit behind their own breaker and are
/// refused while heap pressure is critical.
pub struct ObservationRegistry {
    config: RegistryConfig,
    clock: Arc<dyn Clock>,
    classifier: MemoryPressureClassifier,
    analytics: Arc<dyn AnalyticsSink>,
    breaker: Mutex<CircuitBreaker>,
    detection: Mutex<PerformanceBudgetTracker>,
    detectors: Mutex<Vec<Box<dyn LeakDetector>>>,
    ledger: Arc<ResourceLedger>,
    state: Mutex<RegistryState>,
    timers: Mutex<TimerSet>,
}

impl ObservationRegistry {
    pub fn new(config: RegistryConfig, deps: RegistryDeps) -> Self {
        let ledger = Arc::new(ResourceLedger::new());
        let detectors = default_detectors(
            &ledger,
            Duration::from_millis(config.stale_observation_age_ms),
            config.stale_instance_threshold,
            config.resource_leak_threshold,
        );

        Self {
            detection: Mutex::new(PerformanceBudgetTracker::new(
                config.detection_budget_ms,
                DETECTION_HISTORY,
            )),
            detectors: Mutex::new(detectors),
            ledger,
            state: Mutex::new(RegistryState {
                observations: VecDeque::new(),
                cleanup: CleanupStats::default(),
                last_report: None,
                destroyed: false,
            }),
            config,
            clock: deps.clock,
            classifier: deps.classifier,
            analytics: deps.analytics,
            breaker: Mutex::new(deps.breaker),
            timers: Mutex::new(TimerSet::new()),
        }
    }

    /// Starts watching `target` under `label`.
    ///
    /// `false` when the registry is destroyed, heap pressure is critical,
    /// the breaker is open, or the set is still full after emergency
    /// eviction. Only the last case counts as a breaker failure.
    pub fn add_observation<T>(&self, label: impl Into<String>, target: Weak<T>) -> bool
    where
        T: Send + Sync + 'static,
    {
        if self.state.lock().destroyed {
            return self.reject(RejectionReason::Destroyed);
        }
        // Checked before the breaker so a half-open probe is never spent on it.
        if self.classifier.should_disable_monitoring() {
            return self.reject(RejectionReason::MemoryPressure);
        }
        let admitted = self.breaker.lock().can_execute();
        if !admitted {
            return self.reject(RejectionReason::CircuitOpen);
        }

        let size_hint = std::mem::size_of::<T>();
        let target: Weak<dyn Any + Send + Sync> = target;
        let observation = Observation {
            id: Uuid::new_v4(),
            label: label.into(),
            size_hint,
            target,
            inserted_at: self.clock.now(),
        };

        let mut st = self.state.lock();
        if st.observations.len() >= self.config.max_observations {
            let evicted = self.evict_oldest(&mut st);
            let remaining = st.observations.len();
            if evicted > 0 {
                drop(st);
                warn!(evicted, remaining, "Emergency cleanup of observation registry");
                self.analytics.track(TelemetryEvent::EmergencyCleanup { evicted, remaining });
                st = self.state.lock();
            }
        }

        if st.observations.len() >= self.config.max_observations {
            drop(st);
            self.record_breaker_failure();
            return self.reject(RejectionReason::CapacityExceeded);
        }

        debug!(id = %observation.id, label = %observation.label, "Observation added");
        st.observations.push_back(observation);
        drop(st);
        self.breaker.lock().record_success();
        true
    }

    /// Convenience over [`add_observation`](Self::add_observation).
    pub fn observe<T>(&self, label: impl Into<String>, target: &Arc<T>) -> bool
    where
        T: Send + Sync + 'static,
    {
        self.add_observation(label, Arc::downgrade(target))
    }

    // Drops the oldest share of the set, alive or not.
    fn evict_oldest(&self, st: &mut RegistryState) -> usize {
        let len = st.observations.len();
        let fraction = self.config.emergency_eviction_fraction.clamp(0.0, 1.0);
        let count = ((len as f64) * fraction).ceil() as usize;
        st.observations.drain(..count.min(len));
        count.min(len)
    }

    fn reject(&self, reason: RejectionReason) -> bool {
        debug!(?reason, "Observation rejected");
        self.analytics.track(TelemetryEvent::ObservationRejected { reason });
        false
    }

    fn record_breaker_failure(&self) {
        let (tripped, status) = {
            let mut breaker = self.breaker.lock();
            let tripped = breaker.record_failure();
            (tripped, breaker.status())
        };
        if tripped {
            self.analytics.track(TelemetryEvent::BreakerOpened {
                breaker: status.name,
                failures: status.failure_count,
            });
        }
    }

    /// Detection is refused under critical pressure or with the breaker open.
    /// When it is allowed, the caller owes the breaker an outcome.
    fn should_perform_detection(&self) -> bool {
        !self.classifier.should_disable_monitoring() && self.breaker.lock().can_execute()
    }

    /// Runs every detector over the live observations.
    ///
    /// When detection is not allowed the previous report is returned with
    /// `from_cache` set (an empty one if there never was a report).
    pub fn detect_leaks(&self) -> MemoryLeakReport {
        if self.state.lock().destroyed || !self.should_perform_detection() {
            debug!("Leak detection skipped, serving cached report");
            return self.cached_report();
        }

        let start = self.clock.now();
        let now_unix_ms = self.clock.unix_millis();
        let (summaries, observations, cleanup) = {
            let st = self.state.lock();
            (summarize(&st.observations, start), st.observations.len(), st.cleanup.clone())
        };

        let ctx = DetectionContext {
            observations: &summaries,
            now_unix_ms,
        };
        let leaks: Vec<ComponentLeak> = self
            .detectors
            .lock()
            .iter()
            .flat_map(|detector| detector.detect(&ctx))
            .collect();
        let suggestions = leaks.iter().map(suggest_fix).collect();

        let detection_ms = as_millis_f64(self.clock.now().saturating_duration_since(start));
        let violated = self.detection.lock().record(PerformanceSample {
            timestamp_unix_ms: now_unix_ms,
            overhead_ms: detection_ms,
        });
        if violated {
            warn!(detection_ms, budget_ms = self.config.detection_budget_ms, "Leak detection over budget");
            self.record_breaker_failure();
        } else {
            self.breaker.lock().record_success();
        }

        let heap_used_bytes = self.classifier.heap_used_bytes();
        let report = MemoryLeakReport {
            id: Uuid::new_v4(),
            generated_at_unix_ms: now_unix_ms,
            total_leaks: leaks.len(),
            leaks,
            suggestions,
            memory: MemorySummary {
                heap_used_bytes,
                pressure: self.classifier.classify(heap_used_bytes),
            },
            observations,
            cleanup,
            detection_ms,
            from_cache: false,
        };

        for leak in &report.leaks {
            warn!(
                category = ?leak.category,
                name = %leak.name,
                instances = leak.instances,
                severity = ?leak.severity,
                "Possible leak"
            );
            self.analytics.track(TelemetryEvent::LeakDetected {
                category: leak.category,
                name: leak.name.clone(),
                instances: leak.instances,
                severity: leak.severity,
            });
        }
        info!(leaks = report.total_leaks, observations, detection_ms, "Leak detection complete");

        self.state.lock().last_report = Some(report.clone());
        report
    }

    fn cached_report(&self) -> MemoryLeakReport {
        let st = self.state.lock();
        let mut report = match &st.last_report {
            Some(report) => report.clone(),
            None => {
                let heap_used_bytes = self.classifier.heap_used_bytes();
                let mut report = MemoryLeakReport::empty(
                    self.clock.unix_millis(),
                    MemorySummary {
                        heap_used_bytes,
                        pressure: self.classifier.classify(heap_used_bytes),
                    },
                    st.cleanup.clone(),
                );
                report.observations = st.observations.len();
                report
            }
        };
        report.from_cache = true;
        report
    }

    /// Sweeps dead observations now instead of waiting for the timer.
    pub fn cleanup_now(&self) -> SweepOutcome {
        let now_unix_ms = self.clock.unix_millis();
        let outcome = {
            let mut st = self.state.lock();
            if st.destroyed {
                return SweepOutcome::default();
            }

            let before = st.observations.len();
            let mut released = 0;
            st.observations.retain(|o| {
                if o.is_alive() {
                    true
                } else {
                    released += o.footprint();
                    false
                }
            });
            let len = st.observations.len();
            if st.observations.capacity() > SHRINK_MIN_CAPACITY && len < st.observations.capacity() / 4 {
                st.observations.shrink_to_fit();
            }

            let outcome = SweepOutcome {
                items_cleaned: before - len,
                memory_released: released,
            };
            st.cleanup.record(outcome, now_unix_ms, self.config.cleanup_interval());
            outcome
        };

        if outcome.items_cleaned > 0 {
            info!(
                items_cleaned = outcome.items_cleaned,
                memory_released = outcome.memory_released,
                "Swept dead observations"
            );
        }
        self.analytics.track(TelemetryEvent::CleanupCompleted {
            items_cleaned: outcome.items_cleaned,
            memory_released: outcome.memory_released,
        });
        outcome
    }

    /// Launches the cleanup cycle. Needs a tokio runtime. Calling it twice
    /// is a no-op.
    pub fn start(self: &Arc<Self>) {
        let mut timers = self.timers.lock();
        if timers.active() > 0 || self.state.lock().destroyed {
            return;
        }
        CleanupCycle::spawn(&mut timers, self.config.cleanup_interval(), Arc::downgrade(self));
        info!(
            cleanup_interval_ms = self.config.cleanup_interval_ms,
            max_observations = self.config.max_observations,
            "Observation registry started"
        );
    }

    /// Stops the cleanup cycle and forgets every observation. Safe to call
    /// any number of times.
    pub fn destroy(&self) {
        let timers = self.timers.lock().clear();
        let forgotten = {
            let mut st = self.state.lock();
            st.destroyed = true;
            let forgotten = st.observations.len();
            st.observations.clear();
            st.observations.shrink_to_fit();
            st.last_report = None;
            forgotten
        };
        self.detection.lock().clear();
        self.ledger.clear();
        info!(timers, forgotten, "Observation registry destroyed");
    }

    pub fn add_detector(&self, detector: Box<dyn LeakDetector>) {
        self.detectors.lock().push(detector);
    }

    /// Host-side acquire/release counters the ledger detectors read.
    pub fn ledger(&self) -> &Arc<ResourceLedger> {
        &self.ledger
    }

    /// Observations held, dead or alive.
    pub fn observation_count(&self) -> usize {
        self.state.lock().observations.len()
    }

    pub fn live_count(&self) -> usize {
        self.state.lock().observations.iter().filter(|o| o.is_alive()).count()
    }

    pub fn memory_pressure(&self) -> MemoryPressure {
        self.classifier.check_memory_pressure()
    }

    pub fn cleanup_stats(&self) -> CleanupStats {
        self.state.lock().cleanup.clone()
    }

    pub fn detection_stats(&self) -> OverheadStats {
        self.detection.lock().stats()
    }

    pub fn breaker_status(&self) -> CircuitBreakerStatus {
        self.breaker.lock().status()
    }

    pub fn is_destroyed(&self) -> bool {
        self.state.lock().destroyed
    }

    pub fn active_timers(&self) -> usize {
        self.timers.lock().active()
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }
}

impl Sweep for ObservationRegistry {
    fn sweep(&self) -> SweepOutcome {
        self.cleanup_now()
    }
}

fn summarize(observations: &VecDeque<Observation>, now: Instant) -> Vec<ObservationSummary> {
    let mut by_label: BTreeMap<&str, ObservationSummary> = BTreeMap::new();
    for o in observations.iter().filter(|o| o.is_alive()) {
        let age = now.saturating_duration_since(o.inserted_at);
        let entry = by_label.entry(o.label.as_str()).or_insert_with(|| ObservationSummary {
            label: o.label.clone(),
            live: 0,
            oldest_age: Duration::ZERO,
            estimated_bytes: 0,
        });
        entry.live += 1;
        entry.oldest_age = entry.oldest_age.max(age);
        entry.estimated_bytes += o.size_hint as u64;
    }
    by_label.into_values().collect()
}
