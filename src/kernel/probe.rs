use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sysinfo::{Pid, ProcessesToUpdate, System};

/// Reports how many bytes the host process currently holds.
pub trait HeapProbe: Send + Sync + fmt::Debug {
    fn heap_used_bytes(&self) -> u64;
}

/// Normalised host load figures, each within `0.0..=1.0`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadReading {
    pub cpu_usage: f64,
    pub network_latency: f64,
    pub disk_io: f64,
}

pub trait LoadProbe: Send + Sync + fmt::Debug {
    fn sample(&self) -> LoadReading;
}

/// Reads the real process via `sysinfo`.
///
/// Memory is the resident size of this process; CPU is the global usage
/// across cores. Network latency and disk IO are not measured here and
/// read as idle. Hosts that track them supply their own `LoadProbe`.
pub struct HostProbe {
    system: Mutex<System>,
    pid: Option<Pid>,
}

impl HostProbe {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
            pid: sysinfo::get_current_pid().ok(),
        }
    }
}

impl Default for HostProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HostProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostProbe").field("pid", &self.pid).finish()
    }
}

impl HeapProbe for HostProbe {
    fn heap_used_bytes(&self) -> u64 {
        let Some(pid) = self.pid else {
            return 0;
        };
        let mut sys = self.system.lock();
        sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), false);
        sys.process(pid).map(|p| p.memory()).unwrap_or(0)
    }
}

impl LoadProbe for HostProbe {
    fn sample(&self) -> LoadReading {
        let mut sys = self.system.lock();
        sys.refresh_cpu_usage();
        LoadReading {
            cpu_usage: (f64::from(sys.global_cpu_usage()) / 100.0).clamp(0.0, 1.0),
            network_latency: 0.0,
            disk_io: 0.0,
        }
    }
}

/// Settable probe for tests and demos.
#[derive(Debug, Default)]
pub struct ManualProbe {
    heap_bytes: AtomicU64,
    cpu_bits: AtomicU64,
    network_bits: AtomicU64,
    disk_bits: AtomicU64,
    samples: AtomicU64,
}

impl ManualProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_heap_bytes(&self, bytes: u64) {
        self.heap_bytes.store(bytes, Ordering::SeqCst);
    }

    pub fn set_heap_mb(&self, mb: u64) {
        self.set_heap_bytes(mb * 1024 * 1024);
    }

    pub fn set_load(&self, reading: LoadReading) {
        self.cpu_bits.store(reading.cpu_usage.to_bits(), Ordering::SeqCst);
        self.network_bits.store(reading.network_latency.to_bits(), Ordering::SeqCst);
        self.disk_bits.store(reading.disk_io.to_bits(), Ordering::SeqCst);
    }

    /// Sets every load dimension to the same value.
    pub fn set_uniform_load(&self, load: f64) {
        self.set_load(LoadReading { cpu_usage: load, network_latency: load, disk_io: load });
    }

    /// How many times `sample` has been called.
    pub fn sample_count(&self) -> u64 {
        self.samples.load(Ordering::SeqCst)
    }
}

impl HeapProbe for ManualProbe {
    fn heap_used_bytes(&self) -> u64 {
        self.heap_bytes.load(Ordering::SeqCst)
    }
}

impl LoadProbe for ManualProbe {
    fn sample(&self) -> LoadReading {
        self.samples.fetch_add(1, Ordering::SeqCst);
        LoadReading {
            cpu_usage: f64::from_bits(self.cpu_bits.load(Ordering::SeqCst)),
            network_latency: f64::from_bits(self.network_bits.load(Ordering::SeqCst)),
            disk_io: f64::from_bits(self.disk_bits.load(Ordering::SeqCst)),
        }
    }
}
