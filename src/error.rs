//! Error types for coreinfo

use std::io;
use thiserror::Error;

/// Result type alias for coreinfo operations
pub type Result<T> = std::result::Result<T, CoreInfoError>;

/// Error type for detection and snapshot lifecycle failures.
///
/// Per-component decoders never return errors: missing or contradictory
/// raw data resolves to a conservative default and is reported through
/// the `log` diagnostic channel. Only structural failures that cannot be
/// safely defaulted surface here.
#[derive(Error, Debug)]
pub enum CoreInfoError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Platform configuration query failed
    #[error("Platform query failed: {0}")]
    QueryFailed(String),

    /// Thread/core/package counts failed cross-validation
    #[error("Topology inconsistency: {0}")]
    TopologyInconsistent(String),

    /// Detection attempted on a platform with no usable raw data source
    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    /// Invalid value
    #[error("Invalid value: {0}")]
    InvalidValue(String),
}
