//! Error types for webhook delivery operations.
//!
//! Transport failures are values, not panics: they become the recorded
//! outcome of an attempt and drive the retry state machine. Storage and
//! lifecycle errors carry enough context for the worker to decide whether
//! a claimed row needs to be released.

use thiserror::Error;

/// Result type alias for delivery operations.
pub type Result<T> = std::result::Result<T, DeliveryError>;

/// Error types for webhook delivery operations.
#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    /// Network-level connectivity failure (DNS, connect, TLS, read).
    #[error("network connection failed: {message}")]
    Network {
        /// Description of the network failure.
        message: String,
    },

    /// Outbound HTTP request exceeded the configured timeout.
    #[error("request timeout after {timeout_seconds}s")]
    Timeout {
        /// Seconds before the request timed out.
        timeout_seconds: u64,
    },

    /// The attempt was cancelled by a worker shutdown.
    #[error("request cancelled: worker shutting down")]
    Cancelled,

    /// Database operation failed during delivery.
    #[error("database error: {message}")]
    Database {
        /// Database error message.
        message: String,
    },

    /// Invalid client or roster configuration.
    #[error("configuration error: {message}")]
    Configuration {
        /// Configuration error message.
        message: String,
    },

    /// The worker pool was started while already running.
    #[error("worker pool is already running")]
    AlreadyRunning,

    /// The worker pool was stopped while not running.
    #[error("worker pool is not running")]
    NotRunning,

    /// A worker task panicked while the pool was shutting down.
    #[error("worker {worker_id} panicked: {message}")]
    WorkerPanic {
        /// Identifier of the panicked worker.
        worker_id: String,
        /// Panic message from the join error.
        message: String,
    },
}

impl DeliveryError {
    /// Creates a network error from a message.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network { message: message.into() }
    }

    /// Creates a timeout error.
    pub fn timeout(timeout_seconds: u64) -> Self {
        Self::Timeout { timeout_seconds }
    }

    /// Creates a database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database { message: message.into() }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Whether this error is an outbound transport failure.
    ///
    /// Transport failures are recorded as the attempt's outcome; anything
    /// else means the attempt itself could not be executed or persisted.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Timeout { .. } | Self::Cancelled)
    }
}

impl From<conveyor_core::CoreError> for DeliveryError {
    fn from(err: conveyor_core::CoreError) -> Self {
        Self::Database { message: err.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_identified() {
        assert!(DeliveryError::network("connection refused").is_transport());
        assert!(DeliveryError::timeout(30).is_transport());
        assert!(DeliveryError::Cancelled.is_transport());

        assert!(!DeliveryError::database("connection lost").is_transport());
        assert!(!DeliveryError::AlreadyRunning.is_transport());
        assert!(!DeliveryError::configuration("bad roster").is_transport());
    }

    #[test]
    fn error_display_format() {
        assert_eq!(DeliveryError::timeout(30).to_string(), "request timeout after 30s");
        assert_eq!(
            DeliveryError::network("dns failure").to_string(),
            "network connection failed: dns failure"
        );
        assert_eq!(DeliveryError::NotRunning.to_string(), "worker pool is not running");
    }
}
