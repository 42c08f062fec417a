//! Explicit action registry.
//!
//! Controllers are registered by calling the builder at application assembly
//! time; nothing is discovered implicitly. [`RegistryBuilder::build`]
//! validates the whole set and produces an immutable [`ActionRegistry`].
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use http::StatusCode;
//! use trellis_core::{ActionError, ActionRegistry, Json, ParamMetadata, ParamType};
//!
//! struct Users;
//!
//! impl Users {
//!     async fn list(self: Arc<Self>, page: Option<u32>) -> Result<Json<Vec<u32>>, ActionError> {
//!         Ok(Json(vec![page.unwrap_or(1)]))
//!     }
//!
//!     async fn remove(self: Arc<Self>, id: u32) -> Result<(), ActionError> {
//!         let _ = id;
//!         Ok(())
//!     }
//! }
//!
//! let registry = ActionRegistry::builder()
//!     .controller::<Users>("/users", |c| {
//!         c.authorized();
//!         c.get("/", Users::list)
//!             .arg(ParamMetadata::query("page").typed(ParamType::Integer));
//!         c.delete("/:id", Users::remove)
//!             .arg(ParamMetadata::param("id").required(true))
//!             .authorized_roles(["admin"])
//!             .on_undefined(StatusCode::NO_CONTENT);
//!     })
//!     .build()
//!     .unwrap();
//!
//! let remove = registry.get("Users.remove").unwrap();
//! assert_eq!(remove.route, "/users/:id");
//! assert_eq!(remove.authorized_roles, vec!["admin".to_string()]);
//! ```

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method, StatusCode};
use thiserror::Error;
use trellis_router::{join_paths, PatternError, RouteTable};

use crate::handler::{short_type_name, ActionHandler, Handler};
use crate::interceptor::Interceptor;
use crate::metadata::{ActionMetadata, ParamKind, ParamMetadata, ResponseKind, TransformOptions};
use crate::middleware::Middleware;

/// Errors detected while building the registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Two actions share an id.
    #[error("action '{0}' is registered more than once")]
    DuplicateAction(String),

    /// A keyed parameter has no name.
    #[error("action '{action}' declares a {kind} parameter without a name")]
    MissingParamName {
        /// Offending action.
        action: String,
        /// Parameter kind.
        kind: ParamKind,
    },

    /// A declared header is not a valid header.
    #[error("action '{action}' declares an invalid header: {reason}")]
    InvalidHeader {
        /// Offending action.
        action: String,
        /// What was wrong.
        reason: String,
    },

    /// A route pattern is malformed or collides with another action.
    #[error("action '{action}' has an invalid route: {source}")]
    InvalidRoute {
        /// Offending action.
        action: String,
        /// Pattern failure.
        #[source]
        source: PatternError,
    },
}

/// The immutable set of registered actions.
#[derive(Debug, Clone, Default)]
pub struct ActionRegistry {
    actions: Vec<Arc<ActionMetadata>>,
    index: HashMap<String, usize>,
}

impl ActionRegistry {
    /// Starts a registry builder.
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Looks an action up by id.
    pub fn get(&self, id: &str) -> Option<&Arc<ActionMetadata>> {
        self.index.get(id).map(|&i| &self.actions[i])
    }

    /// Iterates in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<ActionMetadata>> {
        self.actions.iter()
    }

    /// Number of actions.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// True when no action is registered.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Collects controllers into an [`ActionRegistry`].
#[derive(Default)]
pub struct RegistryBuilder {
    actions: Vec<ActionMetadata>,
    errors: Vec<RegistryError>,
}

impl RegistryBuilder {
    /// Registers the actions of controller `C` under `prefix`.
    ///
    /// Controller-level settings made inside `configure` apply to every
    /// action that does not override them, whatever the call order.
    pub fn controller<C: Send + Sync + 'static>(
        mut self,
        prefix: &str,
        configure: impl FnOnce(&mut ControllerBuilder<C>),
    ) -> Self {
        let mut controller = ControllerBuilder::<C>::new(prefix);
        configure(&mut controller);
        controller.finish(&mut self.actions, &mut self.errors);
        self
    }

    /// Validates and freezes the registry.
    pub fn build(self) -> Result<ActionRegistry, RegistryError> {
        if let Some(err) = self.errors.into_iter().next() {
            return Err(err);
        }

        let mut routes = RouteTable::new();
        let mut index = HashMap::with_capacity(self.actions.len());
        let mut actions = Vec::with_capacity(self.actions.len());

        for action in self.actions {
            if index.contains_key(&action.id) {
                return Err(RegistryError::DuplicateAction(action.id));
            }
            if let Some(param) = action
                .params
                .iter()
                .find(|p| p.kind.is_keyed() && p.name.as_deref().map_or(true, str::is_empty))
            {
                return Err(RegistryError::MissingParamName {
                    action: action.id.clone(),
                    kind: param.kind,
                });
            }
            routes
                .insert(action.verb.clone(), &action.route, action.id.clone())
                .map_err(|source| RegistryError::InvalidRoute {
                    action: action.id.clone(),
                    source,
                })?;

            tracing::debug!(action = %action.id, route = %action.route, "registered action");
            index.insert(action.id.clone(), actions.len());
            actions.push(Arc::new(action));
        }

        Ok(ActionRegistry { actions, index })
    }
}

/// Declares the actions of one controller.
pub struct ControllerBuilder<C> {
    name: String,
    prefix: String,
    headers: Vec<(String, String)>,
    authorized: Option<Vec<String>>,
    response_kind: ResponseKind,
    transform_response: Option<bool>,
    interceptors: Vec<Arc<dyn Interceptor>>,
    middlewares: Vec<Arc<dyn Middleware>>,
    actions: Vec<ActionBuilder>,
    _controller: PhantomData<fn() -> C>,
}

impl<C: Send + Sync + 'static> ControllerBuilder<C> {
    fn new(prefix: &str) -> Self {
        Self {
            name: short_type_name::<C>(),
            prefix: prefix.to_string(),
            headers: Vec::new(),
            authorized: None,
            response_kind: ResponseKind::Json,
            transform_response: None,
            interceptors: Vec::new(),
            middlewares: Vec::new(),
            actions: Vec::new(),
            _controller: PhantomData,
        }
    }

    /// Registers an action for `verb` (every verb when `None`).
    pub fn route<T, H: Handler<C, T>>(&mut self, verb: Option<Method>, path: &str, handler: H) -> &mut ActionBuilder {
        let method = method_name::<H>().unwrap_or_else(|| {
            let verb = verb.as_ref().map_or("ALL", Method::as_str);
            format!("{verb} {path}")
        });
        self.actions.push(ActionBuilder::new(
            method,
            verb,
            path.to_string(),
            ActionHandler::new::<C, T, H>(handler),
        ));
        let last = self.actions.len() - 1;
        &mut self.actions[last]
    }

    /// Registers a GET action.
    pub fn get<T, H: Handler<C, T>>(&mut self, path: &str, handler: H) -> &mut ActionBuilder {
        self.route(Some(Method::GET), path, handler)
    }

    /// Registers a POST action.
    pub fn post<T, H: Handler<C, T>>(&mut self, path: &str, handler: H) -> &mut ActionBuilder {
        self.route(Some(Method::POST), path, handler)
    }

    /// Registers a PUT action.
    pub fn put<T, H: Handler<C, T>>(&mut self, path: &str, handler: H) -> &mut ActionBuilder {
        self.route(Some(Method::PUT), path, handler)
    }

    /// Registers a PATCH action.
    pub fn patch<T, H: Handler<C, T>>(&mut self, path: &str, handler: H) -> &mut ActionBuilder {
        self.route(Some(Method::PATCH), path, handler)
    }

    /// Registers a DELETE action.
    pub fn delete<T, H: Handler<C, T>>(&mut self, path: &str, handler: H) -> &mut ActionBuilder {
        self.route(Some(Method::DELETE), path, handler)
    }

    /// Registers a HEAD action.
    pub fn head<T, H: Handler<C, T>>(&mut self, path: &str, handler: H) -> &mut ActionBuilder {
        self.route(Some(Method::HEAD), path, handler)
    }

    /// Registers an OPTIONS action.
    pub fn options<T, H: Handler<C, T>>(&mut self, path: &str, handler: H) -> &mut ActionBuilder {
        self.route(Some(Method::OPTIONS), path, handler)
    }

    /// Registers an action answering every verb.
    pub fn all<T, H: Handler<C, T>>(&mut self, path: &str, handler: H) -> &mut ActionBuilder {
        self.route(None, path, handler)
    }

    /// Renders results of every action as text.
    pub fn text(&mut self) -> &mut Self {
        self.response_kind = ResponseKind::Text;
        self
    }

    /// Requires authorization (no roles) on every action.
    pub fn authorized(&mut self) -> &mut Self {
        self.authorized = Some(Vec::new());
        self
    }

    /// Requires authorization with `roles` on every action.
    pub fn authorized_roles<I, S>(&mut self, roles: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.authorized = Some(roles.into_iter().map(Into::into).collect());
        self
    }

    /// Adds a response header to every action.
    pub fn header(&mut self, name: &str, value: &str) -> &mut Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Sets the transform switch for every action.
    pub fn transform(&mut self, enabled: bool) -> &mut Self {
        self.transform_response = Some(enabled);
        self
    }

    /// Adds an interceptor to every action.
    pub fn interceptor(&mut self, interceptor: impl Interceptor) -> &mut Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    /// Wraps every action in `middleware`.
    pub fn middleware(&mut self, middleware: impl Middleware) -> &mut Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    fn finish(self, out: &mut Vec<ActionMetadata>, errors: &mut Vec<RegistryError>) {
        for action in self.actions {
            let id = format!("{}.{}", self.name, action.method);

            let mut headers = HeaderMap::new();
            for (name, value) in self.headers.iter().chain(action.headers.iter()) {
                match (
                    HeaderName::from_bytes(name.as_bytes()),
                    HeaderValue::from_str(value),
                ) {
                    (Ok(name), Ok(value)) => {
                        headers.insert(name, value);
                    }
                    (Err(err), _) => errors.push(RegistryError::InvalidHeader {
                        action: id.clone(),
                        reason: format!("{name}: {err}"),
                    }),
                    (_, Err(err)) => errors.push(RegistryError::InvalidHeader {
                        action: id.clone(),
                        reason: format!("{name}: {err}"),
                    }),
                }
            }

            let authorized = action.authorized.or_else(|| self.authorized.clone());
            let interceptors = self
                .interceptors
                .iter()
                .cloned()
                .chain(action.interceptors)
                .collect();
            let middlewares = self
                .middlewares
                .iter()
                .cloned()
                .chain(action.middlewares)
                .collect();

            out.push(ActionMetadata {
                id,
                controller: self.name.clone(),
                method: action.method,
                verb: action.verb,
                route: join_paths(&self.prefix, &action.path),
                params: action.params,
                headers,
                success_http_code: action.success_http_code,
                null_result_code: action.null_result_code,
                undefined_result_code: action.undefined_result_code,
                is_authorized_used: authorized.is_some(),
                authorized_roles: authorized.unwrap_or_default(),
                transform_response: action.transform_response.or(self.transform_response),
                transform_options: action.transform_options,
                response_kind: action.response_kind.unwrap_or(self.response_kind),
                interceptors,
                middlewares,
                handler: action.handler,
            });
        }
    }
}

/// Declares one action's parameters and policies.
pub struct ActionBuilder {
    method: String,
    verb: Option<Method>,
    path: String,
    params: Vec<ParamMetadata>,
    headers: Vec<(String, String)>,
    success_http_code: Option<StatusCode>,
    null_result_code: Option<StatusCode>,
    undefined_result_code: Option<StatusCode>,
    authorized: Option<Vec<String>>,
    transform_response: Option<bool>,
    transform_options: Option<TransformOptions>,
    response_kind: Option<ResponseKind>,
    interceptors: Vec<Arc<dyn Interceptor>>,
    middlewares: Vec<Arc<dyn Middleware>>,
    handler: ActionHandler,
}

impl ActionBuilder {
    fn new(method: String, verb: Option<Method>, path: String, handler: ActionHandler) -> Self {
        Self {
            method,
            verb,
            path,
            params: Vec::new(),
            headers: Vec::new(),
            success_http_code: None,
            null_result_code: None,
            undefined_result_code: None,
            authorized: None,
            transform_response: None,
            transform_options: None,
            response_kind: None,
            interceptors: Vec::new(),
            middlewares: Vec::new(),
            handler,
        }
    }

    /// Overrides the method name used in the action id.
    pub fn named(&mut self, method: impl Into<String>) -> &mut Self {
        self.method = method.into();
        self
    }

    /// Declares the next handler argument.
    pub fn arg(&mut self, mut param: ParamMetadata) -> &mut Self {
        param.index = self.params.len();
        self.params.push(param);
        self
    }

    /// Status for successful results.
    pub fn success_code(&mut self, status: StatusCode) -> &mut Self {
        self.success_http_code = Some(status);
        self
    }

    /// Status for `null` results.
    pub fn on_null(&mut self, status: StatusCode) -> &mut Self {
        self.null_result_code = Some(status);
        self
    }

    /// Status for `undefined` results.
    pub fn on_undefined(&mut self, status: StatusCode) -> &mut Self {
        self.undefined_result_code = Some(status);
        self
    }

    /// Adds a response header.
    pub fn header(&mut self, name: &str, value: &str) -> &mut Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Sets the response content type.
    pub fn content_type(&mut self, value: &str) -> &mut Self {
        self.header("content-type", value)
    }

    /// Sets the `Location` header.
    pub fn location(&mut self, url: &str) -> &mut Self {
        self.header("location", url)
    }

    /// Requires authorization without roles.
    pub fn authorized(&mut self) -> &mut Self {
        self.authorized = Some(Vec::new());
        self
    }

    /// Requires authorization with `roles`.
    pub fn authorized_roles<I, S>(&mut self, roles: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.authorized = Some(roles.into_iter().map(Into::into).collect());
        self
    }

    /// Enables or disables result transformation for this action.
    pub fn transform(&mut self, enabled: bool) -> &mut Self {
        self.transform_response = Some(enabled);
        self
    }

    /// Transform options for this action.
    pub fn transform_options(&mut self, options: TransformOptions) -> &mut Self {
        self.transform_options = Some(options);
        self
    }

    /// Renders this action's result as text.
    pub fn text(&mut self) -> &mut Self {
        self.response_kind = Some(ResponseKind::Text);
        self
    }

    /// Renders this action's result as JSON.
    pub fn json(&mut self) -> &mut Self {
        self.response_kind = Some(ResponseKind::Json);
        self
    }

    /// Adds an interceptor.
    pub fn interceptor(&mut self, interceptor: impl Interceptor) -> &mut Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    /// Wraps the action in `middleware`.
    pub fn middleware(&mut self, middleware: impl Middleware) -> &mut Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }
}

/// Method name of a function item, or `None` for closures.
fn method_name<H>() -> Option<String> {
    let full = std::any::type_name::<H>();
    if full.contains("{{closure}}") {
        return None;
    }
    full.rsplit("::").next().map(ToString::to_string)
}
