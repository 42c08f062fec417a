//! # Trellis Telemetry
//!
//! Logging setup for Trellis applications.
//!
//! The dispatch pipeline emits [`tracing`] events and spans (request id,
//! action id, status); this crate installs the subscriber that writes them.
//!
//! ```rust,no_run
//! use trellis_telemetry::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::development()).expect("logging");
//! tracing::info!("ready");
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
pub mod logging;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{build_filter, init_logging, LogConfig, LogFormat};
