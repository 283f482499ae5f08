pub mod backpressure;
pub mod budget;
pub mod load;
pub mod scheduler;
pub mod source;
pub mod types;

pub use budget::{PerformanceBudgetTracker, PerformanceSample};
pub use load::{SystemLoadSampler, SystemLoadSnapshot};
pub use scheduler::{AdaptiveScheduler, SchedulerDeps};
pub use source::{MetricsSource, ProcessMetricsSource};
pub use types::*;
