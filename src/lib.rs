pub mod config;
pub mod error;
pub mod kernel;
pub mod memory;
pub mod monitor;

pub use config::VigilConfig;
pub use error::{Result, VigilError};
pub use kernel::{Supervisor, SupervisorDeps};
pub use memory::ObservationRegistry;
pub use monitor::AdaptiveScheduler;
