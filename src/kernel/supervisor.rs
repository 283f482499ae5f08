use std::sync::Arc;

use tracing::info;

use super::breaker::CircuitBreaker;
use super::probe::{HeapProbe, HostProbe, LoadProbe};
use super::telemetry::{AnalyticsSink, TracingSink};
use super::time::{Clock, TokioClock};
use crate::config::VigilConfig;
use crate::error::Result;
use crate::memory::pressure::MemoryPressureClassifier;
use crate::memory::registry::{ObservationRegistry, RegistryDeps};
use crate::monitor::load::SystemLoadSampler;
use crate::monitor::scheduler::{AdaptiveScheduler, SchedulerDeps};
use crate::monitor::source::{MetricsSource, ProcessMetricsSource};

pub const PERFORMANCE_BREAKER: &str = "performance";
pub const MEMORY_BREAKER: &str = "memory";

/// Outside collaborators shared by the scheduler and the registry.
#[derive(Debug, Clone)]
pub struct SupervisorDeps {
    pub clock: Arc<dyn Clock>,
    pub heap: Arc<dyn HeapProbe>,
    pub load: Arc<dyn LoadProbe>,
    pub source: Arc<dyn MetricsSource>,
    pub analytics: Arc<dyn AnalyticsSink>,
}

impl SupervisorDeps {
    /// Real clock, this process's probes and a counter-backed source.
    pub fn host() -> Self {
        let clock: Arc<dyn Clock> = Arc::new(TokioClock);
        let probe = Arc::new(HostProbe::new());
        let heap: Arc<dyn HeapProbe> = probe.clone();
        let load: Arc<dyn LoadProbe> = probe;
        let source = Arc::new(ProcessMetricsSource::new(clock.clone(), heap.clone(), load.clone()));
        Self {
            clock,
            heap,
            load,
            source,
            analytics: Arc::new(TracingSink),
        }
    }
}

impl Default for SupervisorDeps {
    fn default() -> Self {
        Self::host()
    }
}

/// Owns one scheduler and one registry built from a single config.
///
/// Nothing here is global: construct it once, share it by `Arc`, and call
/// `destroy` when done. The two breakers are built separately and never
/// share counters.
pub struct Supervisor {
    config: VigilConfig,
    scheduler: Arc<AdaptiveScheduler>,
    registry: Arc<ObservationRegistry>,
}

impl Supervisor {
    pub fn new(config: VigilConfig, deps: SupervisorDeps) -> Result<Self> {
        config.validate()?;

        let classifier = MemoryPressureClassifier::new(&config.pressure, deps.heap.clone());
        let sampler = SystemLoadSampler::new(&config.load, deps.load, classifier.clone(), deps.clock.clone());

        let scheduler = AdaptiveScheduler::new(
            config.scheduler.clone(),
            SchedulerDeps {
                clock: deps.clock.clone(),
                source: deps.source,
                sampler,
                breaker: CircuitBreaker::new(
                    PERFORMANCE_BREAKER,
                    &config.performance_breaker,
                    deps.clock.clone(),
                ),
                analytics: deps.analytics.clone(),
            },
        )?;

        let registry = ObservationRegistry::new(
            config.registry.clone(),
            RegistryDeps {
                breaker: CircuitBreaker::new(MEMORY_BREAKER, &config.memory_breaker, deps.clock.clone()),
                clock: deps.clock,
                classifier,
                analytics: deps.analytics,
            },
        );

        Ok(Self {
            config,
            scheduler: Arc::new(scheduler),
            registry: Arc::new(registry),
        })
    }

    /// Launches every timer. Needs a tokio runtime.
    pub fn start(&self) {
        self.scheduler.start();
        self.registry.start();
        info!("Supervisor started");
    }

    /// Tears down both components. Safe to call any number of times.
    pub fn destroy(&self) {
        self.scheduler.destroy();
        self.registry.destroy();
        info!("Supervisor destroyed");
    }

    pub fn scheduler(&self) -> &Arc<AdaptiveScheduler> {
        &self.scheduler
    }

    pub fn registry(&self) -> &Arc<ObservationRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &VigilConfig {
        &self.config
    }

    pub fn active_timers(&self) -> usize {
        self.scheduler.active_timers() + self.registry.active_timers()
    }
}
