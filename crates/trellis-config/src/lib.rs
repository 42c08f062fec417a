//! # Trellis Config
//!
//! Layered configuration for Trellis applications: presets, TOML or JSON
//! files, then `PREFIX__SECTION__KEY` environment overrides. Unknown keys are
//! rejected at every layer.
//!
//! ```toml
//! [server]
//! http_addr = "0.0.0.0:8080"
//! request_timeout_ms = 30000
//!
//! [dispatch]
//! route_prefix = "/api"
//! null_result_code = 404
//!
//! [logging]
//! level = "info"
//! format = "json"
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::TrellisConfig;
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::{DispatchSection, ServerSection};
pub use trellis_telemetry::{LogConfig, LogFormat};
