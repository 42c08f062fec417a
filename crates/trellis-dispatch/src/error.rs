//! Driver lifecycle errors.

use thiserror::Error;
use trellis_router::PatternError;

/// Result type alias using [`DispatchError`].
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Errors raised while assembling or driving a driver.
///
/// Request-level failures are [`trellis_core::ActionError`]s and end up in
/// the response; these stop the driver itself.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// A request reached a driver before `initialize`.
    #[error("driver is not initialized")]
    NotInitialized,

    /// `initialize` was called twice.
    #[error("driver is already initialized")]
    AlreadyInitialized,

    /// Routes were registered twice.
    #[error("routes are already registered")]
    RoutesRegistered,

    /// An action's route could not be added to the route table.
    #[error("cannot register route for action {action}: {source}")]
    InvalidRoute {
        /// Action id.
        action: String,
        /// Underlying pattern error.
        #[source]
        source: PatternError,
    },

    /// A request could not be converted into an action.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}
