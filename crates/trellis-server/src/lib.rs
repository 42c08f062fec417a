//! # Trellis Server
//!
//! HTTP/1.1 driver for the Trellis dispatch pipeline, built on hyper.
//!
//! - [`HyperDriver`] - accepts connections and runs each request through the pipeline
//! - [`ServerConfig`] - bind address, body limit, timeouts
//! - [`ShutdownSignal`] / [`ConnectionTracker`] - graceful shutdown
//!
//! Request bodies are parsed by content type before dispatch (JSON, URL-encoded
//! forms, multipart uploads, text, raw bytes).

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod body;
mod config;
mod driver;
mod error;
mod shutdown;

pub use config::{
    ServerConfig, ServerConfigBuilder, DEFAULT_HTTP_ADDR, DEFAULT_MAX_BODY_BYTES, DEFAULT_SHUTDOWN_TIMEOUT_SECS,
};
pub use driver::{HttpBody, HyperDriver, RemoteAddr};
pub use error::{BodyError, ServerError};
pub use shutdown::{ConnectionToken, ConnectionTracker, ShutdownSignal};
