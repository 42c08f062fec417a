//! Driver options.
//!
//! Options are assembled once with [`DriverOptionsBuilder`] and frozen behind
//! an `Arc`; every request reads them without locking.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use http::StatusCode;
use serde_json::{Map, Value};
use trellis_core::{Container, Interceptor, Reply, TransformOptions};

use crate::checker::{AuthorizationChecker, CurrentUserChecker, ErrorHandler};
use crate::global_error::GlobalErrorHandler;

/// Decides which replies skip result transformation.
pub type PassthroughPredicate = Arc<dyn Fn(&Reply) -> bool + Send + Sync>;

/// Fallback result codes and parameter policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResultDefaults {
    /// Status for `Null` results of actions without their own code.
    pub null_result_code: Option<StatusCode>,
    /// Status for `Undefined` results of actions without their own code.
    pub undefined_result_code: Option<StatusCode>,
    /// Whether parameters without an explicit `required` flag are required.
    pub params_required: bool,
}

/// Frozen driver configuration.
pub struct DriverOptions {
    /// Development mode: error payloads include stacks.
    pub development: bool,
    /// Whether results are transformed before serialization.
    pub class_transformer: bool,
    /// Transform options for actions without their own.
    pub transform_options: TransformOptions,
    /// Replies for which this returns true are never transformed.
    pub passthrough: PassthroughPredicate,
    /// Fallback codes and parameter policy.
    pub defaults: ResultDefaults,
    /// Prefix prepended to every route.
    pub route_prefix: String,
    /// Authorization checker.
    pub authorization_checker: Option<Arc<dyn AuthorizationChecker>>,
    /// Current-user checker.
    pub current_user_checker: Option<Arc<dyn CurrentUserChecker>>,
    /// Application error handler.
    pub error_handler: Option<Arc<dyn ErrorHandler>>,
    /// Interceptors applied to every action, before per-action ones.
    pub interceptors: Vec<Arc<dyn Interceptor>>,
    /// Service container used to resolve controllers.
    pub container: Arc<Container>,
    global_errors: GlobalErrorHandler,
}

impl DriverOptions {
    /// Starts a builder around `container`.
    pub fn builder(container: Arc<Container>) -> DriverOptionsBuilder {
        DriverOptionsBuilder::new(container)
    }

    /// Default options around an empty container.
    pub fn empty() -> Arc<Self> {
        Self::builder(Container::new().freeze()).build()
    }

    /// The global error handler configured for these options.
    pub fn global_errors(&self) -> &GlobalErrorHandler {
        &self.global_errors
    }
}

impl fmt::Debug for DriverOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverOptions")
            .field("development", &self.development)
            .field("class_transformer", &self.class_transformer)
            .field("transform_options", &self.transform_options)
            .field("defaults", &self.defaults)
            .field("route_prefix", &self.route_prefix)
            .field("authorization_checker", &self.authorization_checker.is_some())
            .field("current_user_checker", &self.current_user_checker.is_some())
            .field("error_handler", &self.error_handler.is_some())
            .field("interceptors", &self.interceptors.len())
            .finish_non_exhaustive()
    }
}

/// Builder for [`DriverOptions`].
#[must_use]
pub struct DriverOptionsBuilder {
    development: bool,
    class_transformer: bool,
    transform_options: TransformOptions,
    passthrough: PassthroughPredicate,
    defaults: ResultDefaults,
    route_prefix: String,
    authorization_checker: Option<Arc<dyn AuthorizationChecker>>,
    current_user_checker: Option<Arc<dyn CurrentUserChecker>>,
    error_handler: Option<Arc<dyn ErrorHandler>>,
    error_overriding_map: HashMap<String, Map<String, Value>>,
    interceptors: Vec<Arc<dyn Interceptor>>,
    container: Arc<Container>,
}

impl DriverOptionsBuilder {
    fn new(container: Arc<Container>) -> Self {
        Self {
            development: false,
            class_transformer: true,
            transform_options: TransformOptions::default(),
            passthrough: Arc::new(Reply::is_binary_or_stream),
            defaults: ResultDefaults::default(),
            route_prefix: String::new(),
            authorization_checker: None,
            current_user_checker: None,
            error_handler: None,
            error_overriding_map: HashMap::new(),
            interceptors: Vec::new(),
            container,
        }
    }

    /// Enables development mode.
    pub fn development(mut self, development: bool) -> Self {
        self.development = development;
        self
    }

    /// Enables or disables result transformation.
    pub fn class_transformer(mut self, enabled: bool) -> Self {
        self.class_transformer = enabled;
        self
    }

    /// Sets the global transform options.
    pub fn transform_options(mut self, options: TransformOptions) -> Self {
        self.transform_options = options;
        self
    }

    /// Replaces the passthrough predicate.
    pub fn passthrough<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Reply) -> bool + Send + Sync + 'static,
    {
        self.passthrough = Arc::new(predicate);
        self
    }

    /// Sets the fallback codes and parameter policy.
    pub fn defaults(mut self, defaults: ResultDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// Sets the route prefix.
    pub fn route_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.route_prefix = prefix.into();
        self
    }

    /// Installs the authorization checker.
    pub fn authorization_checker(mut self, checker: impl AuthorizationChecker) -> Self {
        self.authorization_checker = Some(Arc::new(checker));
        self
    }

    /// Installs the current-user checker.
    pub fn current_user_checker(mut self, checker: impl CurrentUserChecker) -> Self {
        self.current_user_checker = Some(Arc::new(checker));
        self
    }

    /// Installs the application error handler.
    pub fn error_handler(mut self, handler: impl ErrorHandler) -> Self {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    /// Adds payload overrides for errors named `name`.
    pub fn error_override(mut self, name: impl Into<String>, fields: Map<String, Value>) -> Self {
        self.error_overriding_map.entry(name.into()).or_default().extend(fields);
        self
    }

    /// Adds a global interceptor.
    pub fn interceptor(mut self, interceptor: impl Interceptor) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    /// Freezes the options.
    pub fn build(self) -> Arc<DriverOptions> {
        let global_errors = GlobalErrorHandler::new(self.development).with_overrides(self.error_overriding_map);
        Arc::new(DriverOptions {
            development: self.development,
            class_transformer: self.class_transformer,
            transform_options: self.transform_options,
            passthrough: self.passthrough,
            defaults: self.defaults,
            route_prefix: self.route_prefix,
            authorization_checker: self.authorization_checker,
            current_user_checker: self.current_user_checker,
            error_handler: self.error_handler,
            interceptors: self.interceptors,
            container: self.container,
            global_errors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let options = DriverOptions::empty();
        assert!(!options.development);
        assert!(options.class_transformer);
        assert!(options.authorization_checker.is_none());
        assert!((options.passthrough)(&Reply::Bytes(Bytes::new())));
        assert!(!(options.passthrough)(&Reply::Json(json!({}))));
    }

    #[test]
    fn test_error_overrides_merge() {
        let mut first = Map::new();
        first.insert("hint".to_string(), json!("a"));
        let mut second = Map::new();
        second.insert("code".to_string(), json!(7));

        let options = DriverOptions::builder(Container::new().freeze())
            .error_override("NotFoundError", first)
            .error_override("NotFoundError", second)
            .build();

        let overrides = options.global_errors().overrides("NotFoundError").unwrap();
        assert_eq!(overrides.len(), 2);
    }
}
