//! Result interceptors.

use crate::action::Action;
use crate::reply::Reply;

/// Rewrites a handler's result before it is transformed and written.
///
/// Global interceptors run first, then the action's own, in registration
/// order. Closures of the form `Fn(&Action, Reply) -> Reply` implement the
/// trait.
///
/// # Example
///
/// ```rust
/// use serde_json::json;
/// use trellis_core::{Action, Interceptor, Reply};
///
/// let wrap = |_: &Action, reply: Reply| match reply {
///     Reply::Json(data) => Reply::Json(json!({ "data": data })),
///     other => other,
/// };
/// let _: &dyn Interceptor = &wrap;
/// ```
pub trait Interceptor: Send + Sync + 'static {
    /// Returns the (possibly replaced) result.
    fn intercept(&self, action: &Action, reply: Reply) -> Reply;
}

impl<F> Interceptor for F
where
    F: Fn(&Action, Reply) -> Reply + Send + Sync + 'static,
{
    fn intercept(&self, action: &Action, reply: Reply) -> Reply {
        self(action, reply)
    }
}
