//! The driver contract.
//!
//! A driver adapts one request/response backend to the dispatch pipeline.
//! Every backend-neutral step has a default here; a driver overrides only
//! what its backend does differently.

use std::fmt;
use std::sync::Arc;

use trellis_core::{
    Action, ActionError, ActionMetadata, ActionRegistry, BoxFuture, Middleware, ParamMetadata, ParamValue, Reply,
};

use crate::error::DispatchResult;
use crate::options::DriverOptions;
use crate::{params, response};

/// Which backend a driver serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverKind {
    /// A hyper HTTP server.
    Hyper,
    /// In-process dispatch with no network.
    Ghost,
    /// AWS Lambda behind API Gateway.
    Lambda,
}

impl DriverKind {
    /// Lowercase label.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hyper => "hyper",
            Self::Ghost => "ghost",
            Self::Lambda => "lambda",
        }
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request/response backend.
pub trait Driver: Send + Sync {
    /// The backend this driver serves.
    fn kind(&self) -> DriverKind;

    /// Frozen options shared with the pipeline.
    fn options(&self) -> &DriverOptions;

    /// Prepares the driver. Must run before routes are served.
    fn initialize(&mut self) -> DispatchResult<()>;

    /// Adds a global middleware, run for every request in registration order.
    fn register_middleware(&mut self, middleware: Arc<dyn Middleware>);

    /// Binds every action in `registry` to its route.
    fn register_routes(&mut self, registry: Arc<ActionRegistry>) -> DispatchResult<()>;

    /// Reads the raw value of `param` from the request.
    fn get_param_from_request<'a>(
        &'a self,
        action: &'a Action,
        param: &'a ParamMetadata,
    ) -> BoxFuture<'a, Result<ParamValue, ActionError>> {
        let value = params::extract(action, param);
        Box::pin(async move { Ok(value) })
    }

    /// Runs the authorization checker for an authorized action.
    fn check_authorization<'a>(
        &'a self,
        action: &'a Action,
        metadata: &'a ActionMetadata,
    ) -> BoxFuture<'a, Result<(), ActionError>> {
        Box::pin(authorize(self.options(), action, metadata))
    }

    /// Writes a successful result into the response.
    fn handle_success(&self, action: &mut Action, reply: Reply, metadata: &ActionMetadata) {
        response::write_success(self.options(), action, reply, metadata);
    }

    /// Writes a failure into the response.
    fn handle_error(&self, action: &mut Action, error: ActionError, metadata: Option<&ActionMetadata>) {
        response::write_error(self.options(), action, &error, metadata);
    }
}

/// Checks `action` against the configured authorization checker.
///
/// Denial is `AuthorizationRequired` for actions without roles and
/// `AccessDenied` for actions with roles.
pub async fn authorize(options: &DriverOptions, action: &Action, metadata: &ActionMetadata) -> Result<(), ActionError> {
    let checker = options
        .authorization_checker
        .as_ref()
        .ok_or(ActionError::AuthorizationCheckerNotDefined)?;

    if checker.check(action, &metadata.authorized_roles).await? {
        return Ok(());
    }

    let method = action.request.method.clone();
    let url = action.request.url();
    if metadata.authorized_roles.is_empty() {
        Err(ActionError::AuthorizationRequired { method, url })
    } else {
        Err(ActionError::AccessDenied { method, url })
    }
}
