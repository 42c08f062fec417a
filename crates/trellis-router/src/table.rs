//! Route table keyed by method and path pattern.

use http::Method;

use crate::methods::MethodSet;
use crate::node::Node;
use crate::params::Params;
use crate::pattern::{self, PatternError};

/// A successful route match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch<'a> {
    /// Id of the action registered for the route.
    pub action_id: &'a str,
    /// Captured path parameters.
    pub params: Params,
}

/// Outcome of looking a request up in the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteLookup<'a> {
    /// A route serves this method and path.
    Found(RouteMatch<'a>),
    /// The path exists but not for this method.
    MethodNotAllowed(Vec<Method>),
    /// Nothing is registered for the path.
    NotFound,
}

/// Maps `(method, pattern)` pairs to action ids.
///
/// # Example
///
/// ```rust
/// use trellis_router::{RouteLookup, RouteTable};
/// use http::Method;
///
/// let mut table = RouteTable::new();
/// table.insert(Some(Method::GET), "/users", "UserController.list").unwrap();
///
/// assert!(matches!(
///     table.lookup(&Method::POST, "/users"),
///     RouteLookup::MethodNotAllowed(_)
/// ));
/// assert_eq!(table.lookup(&Method::GET, "/posts"), RouteLookup::NotFound);
/// ```
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    root: Node,
    route_count: usize,
}

impl RouteTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `action_id` for `method` (every method when `None`) on `pattern`.
    pub fn insert(
        &mut self,
        method: Option<Method>,
        pattern: &str,
        action_id: impl Into<String>,
    ) -> Result<(), PatternError> {
        let segments = pattern::parse(pattern)?;
        let label = method
            .as_ref()
            .map_or_else(|| "ALL".to_string(), ToString::to_string);

        self.root
            .endpoint_mut(&segments)
            .insert(method, action_id)
            .map_err(|_| PatternError::Duplicate {
                method: label,
                pattern: pattern.to_string(),
            })?;
        self.route_count += 1;
        Ok(())
    }

    /// Matches a request, returning the action id and captured parameters.
    #[must_use]
    pub fn match_route(&self, method: &Method, path: &str) -> Option<RouteMatch<'_>> {
        match self.lookup(method, path) {
            RouteLookup::Found(found) => Some(found),
            _ => None,
        }
    }

    /// Matches a request, distinguishing unknown paths from unsupported methods.
    #[must_use]
    pub fn lookup(&self, method: &Method, path: &str) -> RouteLookup<'_> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut params = Params::new();

        let Some(methods) = self.root.find(&segments, &mut params) else {
            return RouteLookup::NotFound;
        };

        match methods.lookup(method) {
            Some(action_id) => RouteLookup::Found(RouteMatch { action_id, params }),
            None => RouteLookup::MethodNotAllowed(methods.allowed_methods()),
        }
    }

    /// Returns the methods registered for `path`, if it is routable.
    #[must_use]
    pub fn allowed_methods(&self, path: &str) -> Option<Vec<Method>> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut params = Params::new();
        self.root
            .find(&segments, &mut params)
            .map(MethodSet::allowed_methods)
    }

    /// Number of registered routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.route_count
    }

    /// Returns true when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.route_count == 0
    }
}
