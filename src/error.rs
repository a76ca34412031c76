//! Error types for the statistics engine

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type for statistics operations
pub type StatsResult<T> = Result<T, StatsError>;

/// Errors surfaced by the statistics engine
///
/// Source failures during collection never show up here; they are swallowed by the
/// collector and leave the matching sub-record absent. What remains are storage
/// failures, which the caller must act on, and the explicit "no data" condition.
#[derive(Error, Debug)]
pub enum StatsError {
    /// I/O operation on the history log failed
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Serialization/deserialization of the history log failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The history log holds no entries
    #[error("No historical data available")]
    NoData,

    /// A collection source did not answer before its deadline
    #[error("Source '{source_name}' timed out after {timeout:?}")]
    SourceTimeout {
        source_name: String,
        timeout: Duration,
    },

    /// The history writer lock could not be acquired
    #[error("Lock error: {0}")]
    Lock(String),

    /// Invalid engine configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl StatsError {
    /// Create an I/O error bound to a path
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a serialization error
    pub fn serialization<E: fmt::Display>(err: E) -> Self {
        Self::Serialization(err.to_string())
    }

    /// Create a lock error
    pub fn lock<E: fmt::Display>(msg: E) -> Self {
        Self::Lock(msg.to_string())
    }

    /// Create a configuration error
    pub fn config<E: fmt::Display>(msg: E) -> Self {
        Self::Config(msg.to_string())
    }

    /// Check if this is the empty-history condition
    pub fn is_no_data(&self) -> bool {
        matches!(self, Self::NoData)
    }

    /// Check if retrying the operation could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io { .. } | Self::Lock(_) | Self::SourceTimeout { .. }
        )
    }
}

impl From<serde_json::Error> for StatsError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err)
    }
}
