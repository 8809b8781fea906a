//! Error types for the crate's edges.
//!
//! The core decision engine (`crate::core`) is infallible at its boundary
//! (spec §7): state-machine and daemon methods return `()`. Errors only
//! surface where this crate actually touches the outside world — config
//! loading and the concrete adapters in `crate::adapters`.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file at {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write config file at {path}: {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config file at {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("failed to determine config directory: {0}")]
    DirectoryError(String),

    #[error("invalid config value: {0}")]
    ValidationError(String),
}

/// Errors a concrete adapter may encounter translating the outside world
/// into the core's event vocabulary. Adapters are expected to log and
/// degrade rather than propagate these into the daemon loop (spec §7).
#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("idle time query failed: {0}")]
    IdleQuery(String),

    #[error("{subsystem} adapter failed to initialize: {message}")]
    Init { subsystem: &'static str, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = ConfigError::ValidationError("timeout must be positive".to_string());
        assert_eq!(err.to_string(), "invalid config value: timeout must be positive");
    }

    #[test]
    fn adapter_error_display() {
        let err = AdapterError::Init { subsystem: "idle", message: "no display".to_string() };
        assert_eq!(err.to_string(), "idle adapter failed to initialize: no display");
    }
}
