use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;

use crate::config::LoadConfig;
use crate::kernel::probe::LoadProbe;
use crate::kernel::time::Clock;
use crate::memory::pressure::{MemoryPressure, MemoryPressureClassifier};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SystemLoadSnapshot {
    pub cpu_usage: f64,
    /// Heap usage as a share of the critical threshold.
    pub memory_pressure: f64,
    pub memory_level: MemoryPressure,
    pub network_latency: f64,
    pub disk_io: f64,
    /// Combined load, `0.0..=1.0`.
    pub overall_load: f64,
    pub sampled_at_unix_ms: u64,
}

impl SystemLoadSnapshot {
    /// The busiest single dimension or the mean of all four, whichever is
    /// higher. A saturated CPU is high load even when everything else idles.
    pub fn combine(cpu: f64, memory: f64, network: f64, disk: f64) -> f64 {
        let mean = (cpu + memory + network + disk) / 4.0;
        mean.max(cpu).max(memory).clamp(0.0, 1.0)
    }
}

/// Measures system load at most once per TTL window.
#[derive(Debug)]
pub struct SystemLoadSampler {
    probe: Arc<dyn LoadProbe>,
    classifier: MemoryPressureClassifier,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    cache: Mutex<Option<(Instant, SystemLoadSnapshot)>>,
}

impl SystemLoadSampler {
    pub fn new(
        config: &LoadConfig,
        probe: Arc<dyn LoadProbe>,
        classifier: MemoryPressureClassifier,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            probe,
            classifier,
            clock,
            ttl: Duration::from_millis(config.cache_ttl_ms),
            cache: Mutex::new(None),
        }
    }

    /// Cached snapshot, re-measured once the TTL has passed.
    pub fn snapshot(&self) -> SystemLoadSnapshot {
        let now = self.clock.now();
        let mut cache = self.cache.lock();
        if let Some((taken_at, snapshot)) = *cache {
            if now.saturating_duration_since(taken_at) < self.ttl {
                return snapshot;
            }
        }

        let snapshot = self.measure();
        *cache = Some((now, snapshot));
        snapshot
    }

    /// Bypasses the cache.
    pub fn refresh(&self) -> SystemLoadSnapshot {
        let snapshot = self.measure();
        *self.cache.lock() = Some((self.clock.now(), snapshot));
        snapshot
    }

    pub fn invalidate(&self) {
        self.cache.lock().take();
    }

    pub fn classifier(&self) -> &MemoryPressureClassifier {
        &self.classifier
    }

    fn measure(&self) -> SystemLoadSnapshot {
        let reading = self.probe.sample();
        let used = self.classifier.heap_used_bytes();
        let memory_pressure = self.classifier.ratio_of(used);
        let cpu = reading.cpu_usage.clamp(0.0, 1.0);
        let network = reading.network_latency.clamp(0.0, 1.0);
        let disk = reading.disk_io.clamp(0.0, 1.0);

        let snapshot = SystemLoadSnapshot {
            cpu_usage: cpu,
            memory_pressure,
            memory_level: self.classifier.classify(used),
            network_latency: network,
            disk_io: disk,
            overall_load: SystemLoadSnapshot::combine(cpu, memory_pressure, network, disk),
            sampled_at_unix_ms: self.clock.unix_millis(),
        };
        debug!(overall = snapshot.overall_load, cpu, memory = memory_pressure, "System load sampled");
        snapshot
    }
}
