//! Lambda driver errors.

use thiserror::Error;
use trellis_dispatch::DispatchError;

/// Failures that prevent an invocation from producing a response.
#[derive(Error, Debug)]
pub enum LambdaError {
    /// The payload is not an API Gateway proxy event.
    #[error("unsupported event: {0}")]
    Event(#[from] serde_json::Error),

    /// The event could not be turned into a request.
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    /// A base64 body did not decode.
    #[error("invalid base64 body: {0}")]
    Base64(#[from] base64::DecodeError),

    /// The pipeline could not run.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// Result alias for Lambda operations.
pub type LambdaResult<T> = Result<T, LambdaError>;
