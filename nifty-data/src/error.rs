use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// All errors generated while fetching and reshaping upstream market data.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Deserialize, Serialize, Error)]
pub enum DataError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("upstream rate limited the request (HTTP 429)")]
    RateLimited,

    #[error("upstream returned non-success status: {status}")]
    Status { status: u16 },

    #[error("malformed upstream payload: {0}")]
    Malformed(String),

    #[error("payload failed validation: {0}")]
    Validation(String),

    #[error("no data for {entity}")]
    Empty { entity: String },

    #[error("request to {url} gave up after {attempts} attempts, last error: {last}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        last: Box<DataError>,
    },
}

impl DataError {
    /// Determine if a single failed attempt is worth another try within the attempt budget.
    #[allow(clippy::match_like_matches_macro)]
    pub fn is_retryable(&self) -> bool {
        match self {
            DataError::Transport(_)
            | DataError::Timeout(_)
            | DataError::RateLimited
            | DataError::Status { .. } => true,
            _ => false,
        }
    }
}

/// Errors raised by the persistent snapshot backend.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Error)]
pub enum BackendError {
    #[error("backend connection failure: {0}")]
    Connection(String),

    #[error("backend operation timed out")]
    Timeout,

    #[error("backend rejected command: {0}")]
    Response(String),

    #[error("snapshot (de)serialisation failed: {0}")]
    Serde(String),
}

impl BackendError {
    /// Connectivity conditions that are expected when the backend goes away. Anything else
    /// points at a bug or a data problem and is logged louder, even though the store still
    /// falls back.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, BackendError::Connection(_) | BackendError::Timeout)
    }
}

impl From<redis::RedisError> for BackendError {
    fn from(error: redis::RedisError) -> Self {
        if error.is_timeout() {
            BackendError::Timeout
        } else if error.is_io_error()
            || error.is_connection_dropped()
            || error.is_connection_refusal()
        {
            BackendError::Connection(error.to_string())
        } else {
            BackendError::Response(error.to_string())
        }
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(error: serde_json::Error) -> Self {
        BackendError::Serde(error.to_string())
    }
}

/// Fatal configuration errors, surfaced once at startup.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum ConfigError {
    #[error("missing credential: environment variable {0} is not set")]
    MissingCredential(&'static str),

    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },

    #[error("request timeout {timeout:?} must be strictly below the scan interval {interval:?}")]
    TimeoutNotBelowInterval {
        timeout: Duration,
        interval: Duration,
    },
}
