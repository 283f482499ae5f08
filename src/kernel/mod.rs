pub mod breaker;
pub mod cleanup;
pub mod probe;
pub mod supervisor;
pub mod telemetry;
pub mod time;
pub mod timers;

pub use breaker::{CircuitBreaker, CircuitBreakerStatus, CircuitState};
pub use probe::{HeapProbe, HostProbe, LoadProbe, LoadReading, ManualProbe};
pub use supervisor::{Supervisor, SupervisorDeps};
pub use time::{Clock, ManualClock, TokioClock};
