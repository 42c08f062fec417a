//! Telemetry errors.

use thiserror::Error;

/// Failures while setting up logging.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The level filter did not parse.
    #[error("invalid log filter '{filter}': {reason}")]
    InvalidFilter {
        /// The filter string.
        filter: String,
        /// Parse failure.
        reason: String,
    },

    /// A global subscriber is already installed.
    #[error("failed to initialize logging: {0}")]
    LoggingInit(String),
}

/// Result alias for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
