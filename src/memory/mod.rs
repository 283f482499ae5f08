pub mod detectors;
pub mod pressure;
pub mod registry;
pub mod types;

pub use detectors::{LeakDetector, LedgerLeakDetector, ResourceLedger, StaleObservationDetector};
pub use pressure::{MemoryPressure, MemoryPressureClassifier};
pub use registry::{ObservationRegistry, RegistryDeps};
pub use types::*;
