//! Unified error types for the controller.
//!
//! Nothing in the control path is fatal: handlers degrade toward the safe
//! default (fan off, state `Normal`) and report through logs and alerts.
//! These types exist for the edges that genuinely can fail, i.e. storage
//! and configuration, plus the skipped-evaluation signal raised when a
//! sensor cluster has no usable readings.

use thiserror::Error;

use crate::sensors::SensorRole;

// ---------------------------------------------------------------------------
// Storage errors
// ---------------------------------------------------------------------------

/// Errors from [`StoragePort`](crate::app::ports::StoragePort) operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Requested key does not exist.
    #[error("key not found")]
    NotFound,
    /// The backend failed to read or write.
    #[error("I/O error: {0}")]
    Io(String),
    /// A stored blob could not be decoded.
    #[error("stored value corrupted")]
    Corrupted,
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound
        } else {
            Self::Io(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field failed range or consistency validation.
    /// The message names the field and the accepted range.
    #[error("validation failed: {0}")]
    ValidationFailed(&'static str),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Parse(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Control errors
// ---------------------------------------------------------------------------

/// Conditions that abort a single handler step without touching state.
#[derive(Debug, Error)]
pub enum ControlError {
    /// Every sensor in the cluster is stale or has no value.
    #[error("no active sensors in the {0} cluster")]
    SensorUnavailable(SensorRole),
}
