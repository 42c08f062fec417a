//! Application-supplied collaborators.
//!
//! The authorization checker, the current-user checker and the custom error
//! handler are provided by the hosting application. Plain closures implement
//! each trait; implement the trait on a type when the check needs to fail
//! with its own error.

use std::future::Future;

use serde_json::Value;
use trellis_core::{Action, ActionError, ActionMetadata, BoxFuture};

/// Decides whether a request may run an authorized action.
///
/// # Example
///
/// ```rust
/// use trellis_core::Action;
/// use trellis_dispatch::AuthorizationChecker;
///
/// let checker = |action: &Action, roles: &[String]| {
///     let role = action.request.header("x-role").map(str::to_owned);
///     let allowed = match role {
///         Some(role) => roles.is_empty() || roles.contains(&role),
///         None => false,
///     };
///     async move { allowed }
/// };
/// let _: &dyn AuthorizationChecker = &checker;
/// ```
pub trait AuthorizationChecker: Send + Sync + 'static {
    /// Returns whether the request may proceed for `roles`.
    fn check<'a>(&'a self, action: &'a Action, roles: &'a [String]) -> BoxFuture<'a, Result<bool, ActionError>>;
}

impl<F, Fut> AuthorizationChecker for F
where
    F: Fn(&Action, &[String]) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = bool> + Send + 'static,
{
    fn check<'a>(&'a self, action: &'a Action, roles: &'a [String]) -> BoxFuture<'a, Result<bool, ActionError>> {
        let fut = self(action, roles);
        Box::pin(async move { Ok(fut.await) })
    }
}

/// Resolves the identity behind a request.
///
/// `None` means the request has no current user.
pub trait CurrentUserChecker: Send + Sync + 'static {
    /// Returns the current user, if any.
    fn current_user<'a>(&'a self, action: &'a Action) -> BoxFuture<'a, Result<Option<Value>, ActionError>>;
}

impl<F, Fut> CurrentUserChecker for F
where
    F: Fn(&Action) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Option<Value>> + Send + 'static,
{
    fn current_user<'a>(&'a self, action: &'a Action) -> BoxFuture<'a, Result<Option<Value>, ActionError>> {
        let fut = self(action);
        Box::pin(async move { Ok(fut.await) })
    }
}

/// Application error handler, consulted before the global error handler.
///
/// The returned value becomes the response body; `None` sends no body.
/// The response status is already set from the error when it runs.
pub trait ErrorHandler: Send + Sync + 'static {
    /// Produces the error payload.
    fn on_error(&self, error: &ActionError, action: &Action, metadata: Option<&ActionMetadata>) -> Option<Value>;
}

impl<F> ErrorHandler for F
where
    F: Fn(&ActionError, &Action, Option<&ActionMetadata>) -> Option<Value> + Send + Sync + 'static,
{
    fn on_error(&self, error: &ActionError, action: &Action, metadata: Option<&ActionMetadata>) -> Option<Value> {
        self(error, action, metadata)
    }
}
