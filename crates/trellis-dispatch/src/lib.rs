//! # Trellis Dispatch
//!
//! The request pipeline shared by every Trellis backend.
//!
//! - [`Driver`] - contract each backend implements, with shared defaults
//! - [`Dispatcher`] - routing, 404/405 handling and the middleware chain
//! - [`ActionExecutor`] - authorization, parameter resolution and handler invocation
//! - [`ResultTransformer`] - projection of JSON results before serialization
//! - [`GlobalErrorHandler`] - default error payloads
//! - [`GhostDriver`] - in-process backend used by tests and embedding hosts
//!
//! ## Request flow
//!
//! ```text
//! request -> Dispatcher (route) -> middleware chain -> ActionExecutor
//!   authorize -> resolve params -> handler -> interceptors
//!   -> Driver::handle_success | Driver::handle_error -> response
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod checker;
mod dispatcher;
mod driver;
mod error;
mod executor;
mod ghost;
mod global_error;
mod options;
pub mod params;
pub mod response;
mod transform;

pub use checker::{AuthorizationChecker, CurrentUserChecker, ErrorHandler};
pub use dispatcher::Dispatcher;
pub use driver::{authorize, Driver, DriverKind};
pub use error::{DispatchError, DispatchResult};
pub use executor::ActionExecutor;
pub use ghost::{GhostBody, GhostDriver, GhostRequest, GhostResponse};
pub use global_error::GlobalErrorHandler;
pub use options::{DriverOptions, DriverOptionsBuilder, PassthroughPredicate, ResultDefaults};
pub use transform::{project, ResultTransformer};
