use thiserror::Error;

/// Errors surfaced by the kernel.
///
/// Resource pressure (open circuit, full queue, capacity reached) is NOT an
/// error here: those paths answer `None`/`false` and recover locally.
/// Only a failing metrics source propagates, after the breaker has been told.
#[derive(Debug, Error)]
pub enum VigilError {
    #[error("metrics collection failed: {0}")]
    CollectionFailed(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = VigilError> = std::result::Result<T, E>;
