//! Error types for the offline cache controller.
//!
//! Every fallible operation in the crate returns [`CacheError`]. Network
//! failures are kept distinct from storage failures because only the former
//! trigger the offline fallback chain.

use std::path::PathBuf;
use thiserror::Error;

use crate::controller::ControllerState;

/// Main error type for the cache controller.
#[derive(Debug, Error)]
pub enum CacheError {
    // Network errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        /// Optional cause description
        cause: Option<String>,
    },

    #[error("Request timeout after {0:?}")]
    Timeout(std::time::Duration),

    // Storage errors
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Request errors
    #[error("Invalid URL {url}: {message}")]
    InvalidUrl { url: String, message: String },

    // Lifecycle errors
    #[error("Invalid controller state: expected {expected}, got {actual}")]
    InvalidState {
        expected: String,
        actual: ControllerState,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<rusqlite::Error> for CacheError {
    fn from(err: rusqlite::Error) -> Self {
        CacheError::Database {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<url::ParseError> for CacheError {
    fn from(err: url::ParseError) -> Self {
        CacheError::InvalidUrl {
            url: String::new(),
            message: err.to_string(),
        }
    }
}

impl CacheError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        CacheError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Create a network error from a plain message.
    pub fn network(message: impl Into<String>) -> Self {
        CacheError::Network {
            message: message.into(),
            cause: None,
        }
    }

    /// Whether this error means the upstream could not be reached.
    ///
    /// Only these errors engage the offline fallback chain; storage errors
    /// are reported as-is.
    pub fn is_network_failure(&self) -> bool {
        matches!(self, CacheError::Network { .. } | CacheError::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CacheError::InvalidState {
            expected: ControllerState::Installing.to_string(),
            actual: ControllerState::Redundant,
        };
        assert_eq!(
            err.to_string(),
            "Invalid controller state: expected installing, got redundant"
        );
    }

    #[test]
    fn test_network_failures() {
        assert!(CacheError::network("offline").is_network_failure());
        assert!(CacheError::Timeout(std::time::Duration::from_secs(5)).is_network_failure());
        assert!(!CacheError::Config {
            message: "bad".into()
        }
        .is_network_failure());
        assert!(!CacheError::Database {
            message: "quota".into(),
            source: None
        }
        .is_network_failure());
    }

    #[test]
    fn test_invalid_state_display() {
        let err = CacheError::InvalidState {
            expected: "installed".into(),
            actual: ControllerState::Parsed,
        };
        assert_eq!(
            err.to_string(),
            "Invalid controller state: expected installed, got parsed"
        );
    }
}
