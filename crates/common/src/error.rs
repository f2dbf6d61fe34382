//! Common error types for the ops core crates.

use std::fmt;

/// A specialized Result type for ops core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for ops core operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Healthcheck error: {0}")]
    Healthcheck(String),

    #[error("Telemetry error: {0}")]
    Telemetry(String),
}

impl Error {
    /// Create a new cache error.
    pub fn cache(msg: impl fmt::Display) -> Self {
        Error::Cache(msg.to_string())
    }

    /// Create a new healthcheck error.
    pub fn healthcheck(msg: impl fmt::Display) -> Self {
        Error::Healthcheck(msg.to_string())
    }

    /// Create a new telemetry error.
    pub fn telemetry(msg: impl fmt::Display) -> Self {
        Error::Telemetry(msg.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_from() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::AddrInUse, "port taken").into();
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(err.to_string(), "IO error: port taken");
    }

    #[test]
    fn test_error_display() {
        assert_eq!(Error::cache("down").to_string(), "Cache error: down");
        assert_eq!(
            Error::telemetry("exporter closed").to_string(),
            "Telemetry error: exporter closed"
        );
    }
}
