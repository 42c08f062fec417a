//! Middleware around action execution.
//!
//! Middleware wraps the dispatch of one action. It receives the mutable
//! [`Action`] and a [`Next`] handle; calling [`Next::run`] continues down the
//! chain and eventually executes the action. A middleware that does not call
//! `next` short-circuits the request and is responsible for the response.
//!
//! Returning an error hands it to the driver's error shaping, exactly as if
//! the action itself had failed.
//!
//! # Example
//!
//! ```rust
//! use http::HeaderValue;
//! use trellis_core::{Action, ActionError, BoxFuture, Middleware, Next};
//!
//! struct PoweredBy;
//!
//! impl Middleware for PoweredBy {
//!     fn name(&self) -> &'static str {
//!         "powered-by"
//!     }
//!
//!     fn handle<'a>(
//!         &'a self,
//!         action: &'a mut Action,
//!         next: Next<'a>,
//!     ) -> BoxFuture<'a, Result<(), ActionError>> {
//!         Box::pin(async move {
//!             next.run(action).await?;
//!             action
//!                 .response
//!                 .headers
//!                 .insert("x-powered-by", HeaderValue::from_static("trellis"));
//!             Ok(())
//!         })
//!     }
//! }
//! ```

use std::sync::Arc;

use crate::action::Action;
use crate::error::ActionError;
use crate::BoxFuture;

/// A stage wrapped around action execution.
pub trait Middleware: Send + Sync + 'static {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Processes the action, usually by awaiting `next.run(action)`.
    fn handle<'a>(&'a self, action: &'a mut Action, next: Next<'a>) -> BoxFuture<'a, Result<(), ActionError>>;
}

/// The innermost stage of a middleware chain.
pub trait Endpoint: Send + Sync {
    /// Runs the stage.
    fn call<'a>(&'a self, action: &'a mut Action) -> BoxFuture<'a, Result<(), ActionError>>;
}

/// The rest of a middleware chain.
pub struct Next<'a> {
    chain: &'a [Arc<dyn Middleware>],
    endpoint: &'a dyn Endpoint,
}

impl<'a> Next<'a> {
    /// Creates a chain that runs `chain` in order, then `endpoint`.
    pub fn new(chain: &'a [Arc<dyn Middleware>], endpoint: &'a dyn Endpoint) -> Self {
        Self { chain, endpoint }
    }

    /// Continues with the next stage.
    pub fn run<'b>(self, action: &'b mut Action) -> BoxFuture<'b, Result<(), ActionError>>
    where
        'a: 'b,
    {
        match self.chain.split_first() {
            Some((first, rest)) => {
                tracing::trace!(middleware = first.name(), "entering middleware");
                first.handle(action, Next { chain: rest, endpoint: self.endpoint })
            }
            None => self.endpoint.call(action),
        }
    }
}

/// Middleware that runs a synchronous hook before the rest of the chain.
///
/// Created with [`before`].
pub struct Before<F> {
    name: &'static str,
    hook: F,
}

/// Middleware that runs a synchronous hook after the rest of the chain.
///
/// Created with [`after`].
pub struct After<F> {
    name: &'static str,
    hook: F,
}

/// Wraps `hook` as middleware that runs before the action.
pub fn before<F>(name: &'static str, hook: F) -> Before<F>
where
    F: Fn(&mut Action) -> Result<(), ActionError> + Send + Sync + 'static,
{
    Before { name, hook }
}

/// Wraps `hook` as middleware that runs after the action.
pub fn after<F>(name: &'static str, hook: F) -> After<F>
where
    F: Fn(&mut Action) -> Result<(), ActionError> + Send + Sync + 'static,
{
    After { name, hook }
}

impl<F> Middleware for Before<F>
where
    F: Fn(&mut Action) -> Result<(), ActionError> + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn handle<'a>(&'a self, action: &'a mut Action, next: Next<'a>) -> BoxFuture<'a, Result<(), ActionError>> {
        Box::pin(async move {
            (self.hook)(action)?;
            next.run(action).await
        })
    }
}

impl<F> Middleware for After<F>
where
    F: Fn(&mut Action) -> Result<(), ActionError> + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn handle<'a>(&'a self, action: &'a mut Action, next: Next<'a>) -> BoxFuture<'a, Result<(), ActionError>> {
        Box::pin(async move {
            next.run(action).await?;
            (self.hook)(action)
        })
    }
}
