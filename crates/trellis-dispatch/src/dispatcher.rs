//! Routing and the middleware chain.
//!
//! [`Dispatcher`] holds what every driver needs between a normalized request
//! and the executor: the frozen options, the registry, the route table and
//! the global middleware. Drivers own one and delegate their lifecycle
//! methods to it.

use std::sync::Arc;

use trellis_core::{Action, ActionError, ActionMetadata, ActionRegistry, BoxFuture, Endpoint, HttpError, Middleware, Next};
use trellis_router::{join_paths, RouteLookup, RouteTable};

use crate::driver::{Driver, DriverKind};
use crate::error::{DispatchError, DispatchResult};
use crate::executor::ActionExecutor;
use crate::options::DriverOptions;
use crate::response;

/// Shared dispatch state of a driver.
pub struct Dispatcher {
    options: Arc<DriverOptions>,
    middlewares: Vec<Arc<dyn Middleware>>,
    registry: Option<Arc<ActionRegistry>>,
    routes: RouteTable,
    initialized: bool,
}

impl Dispatcher {
    /// Creates an uninitialized dispatcher.
    pub fn new(options: Arc<DriverOptions>) -> Self {
        Self {
            options,
            middlewares: Vec::new(),
            registry: None,
            routes: RouteTable::new(),
            initialized: false,
        }
    }

    /// The frozen options.
    pub fn options(&self) -> &DriverOptions {
        &self.options
    }

    /// A shared handle to the options.
    pub fn shared_options(&self) -> Arc<DriverOptions> {
        Arc::clone(&self.options)
    }

    /// Marks the dispatcher ready.
    pub fn initialize(&mut self, kind: DriverKind) -> DispatchResult<()> {
        if self.initialized {
            return Err(DispatchError::AlreadyInitialized);
        }
        self.initialized = true;
        tracing::info!(
            driver = %kind,
            route_prefix = %self.options.route_prefix,
            development = self.options.development,
            "driver initialized"
        );
        Ok(())
    }

    /// Whether [`Dispatcher::initialize`] has run.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Appends a global middleware.
    pub fn register_middleware(&mut self, middleware: Arc<dyn Middleware>) {
        tracing::debug!(middleware = middleware.name(), "middleware registered");
        self.middlewares.push(middleware);
    }

    /// Builds the route table from `registry`.
    pub fn register_routes(&mut self, registry: Arc<ActionRegistry>) -> DispatchResult<()> {
        if self.registry.is_some() {
            return Err(DispatchError::RoutesRegistered);
        }

        let mut routes = RouteTable::new();
        for metadata in registry.iter() {
            let path = join_paths(&self.options.route_prefix, &metadata.route);
            routes
                .insert(metadata.verb.clone(), &path, metadata.id.clone())
                .map_err(|source| DispatchError::InvalidRoute {
                    action: metadata.id.clone(),
                    source,
                })?;
            tracing::debug!(
                action = %metadata.id,
                method = metadata.verb.as_ref().map_or("ALL", http::Method::as_str),
                path = %path,
                "route registered"
            );
        }

        tracing::info!(routes = routes.len(), "routes registered");
        self.routes = routes;
        self.registry = Some(registry);
        Ok(())
    }

    /// The route table.
    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Routes `action` and runs it through the middleware chain.
    ///
    /// Unknown paths are answered with 404 and known paths with the wrong
    /// method with 405. Global middleware runs in both cases.
    pub async fn dispatch(&self, driver: &dyn Driver, action: &mut Action) -> DispatchResult<()> {
        if !self.initialized {
            return Err(DispatchError::NotInitialized);
        }

        let metadata = self.route(action);
        let result = match metadata {
            Some(metadata) => {
                let chain: Vec<Arc<dyn Middleware>> = self
                    .middlewares
                    .iter()
                    .chain(&metadata.middlewares)
                    .cloned()
                    .collect();
                let executor = ActionExecutor::new(driver, metadata);
                Next::new(&chain, &executor).run(action).await
            }
            None => Next::new(&self.middlewares, &Unrouted { routes: &self.routes })
                .run(action)
                .await,
        };

        if let Err(error) = result {
            driver.handle_error(action, error, metadata.map(|m| &**m));
        }
        Ok(())
    }

    fn route(&self, action: &mut Action) -> Option<&Arc<ActionMetadata>> {
        let registry = self.registry.as_ref()?;
        match self.routes.lookup(&action.request.method, action.request.path()) {
            RouteLookup::Found(found) => {
                let metadata = registry.get(found.action_id)?;
                action.request.params = found.params;
                Some(metadata)
            }
            RouteLookup::MethodNotAllowed(_) | RouteLookup::NotFound => None,
        }
    }
}

/// Endpoint for requests no route matched.
struct Unrouted<'a> {
    routes: &'a RouteTable,
}

impl Endpoint for Unrouted<'_> {
    fn call<'b>(&'b self, action: &'b mut Action) -> BoxFuture<'b, Result<(), ActionError>> {
        Box::pin(async move {
            let method = action.request.method.clone();
            let path = action.request.path().to_string();
            match self.routes.allowed_methods(&path) {
                Some(allowed) if !allowed.is_empty() => {
                    response::set_allow(action, &allowed);
                    Err(HttpError::method_not_allowed(format!("Method {method} is not allowed on {path}")).into())
                }
                _ => Err(HttpError::not_found(format!("Cannot {method} {path}")).into()),
            }
        })
    }
}
