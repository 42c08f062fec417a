//! Server errors.

use thiserror::Error;
use trellis_dispatch::DispatchError;

/// Errors that stop the hyper driver.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The configured address is not a socket address.
    #[error("invalid address '{addr}': {source}")]
    InvalidAddress {
        /// The configured address.
        addr: String,
        /// Parse failure.
        #[source]
        source: std::net::AddrParseError,
    },

    /// The listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// The address.
        addr: std::net::SocketAddr,
        /// I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The driver was not ready to serve.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// Failures while reading a request body.
#[derive(Error, Debug)]
pub enum BodyError {
    /// The body exceeded the configured limit.
    #[error("request body exceeds {limit} bytes")]
    TooLarge {
        /// The limit in bytes.
        limit: usize,
    },

    /// The body could not be read.
    #[error("failed to read request body: {0}")]
    Read(String),

    /// A JSON body did not parse.
    #[error("invalid JSON body: {0}")]
    Json(#[from] serde_json::Error),

    /// A form body did not parse.
    #[error("invalid form body: {0}")]
    Form(#[from] serde_urlencoded::de::Error),

    /// A multipart body did not parse.
    #[error("invalid multipart body: {0}")]
    Multipart(#[from] multer::Error),
}
