//! Per-path method table.

use http::Method;

/// Maps HTTP methods to action ids for one route path.
///
/// A method-less entry (registered with `None`) answers every verb that has
/// no explicit entry, the way `ALL` routes do in controller frameworks.
///
/// # Example
///
/// ```rust
/// use trellis_router::MethodSet;
/// use http::Method;
///
/// let mut set = MethodSet::new();
/// set.insert(Some(Method::GET), "list").unwrap();
/// set.insert(None, "fallback").unwrap();
///
/// assert_eq!(set.lookup(&Method::GET), Some("list"));
/// assert_eq!(set.lookup(&Method::DELETE), Some("fallback"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct MethodSet {
    explicit: Vec<(Method, String)>,
    any: Option<String>,
}

impl MethodSet {
    /// Creates an empty method set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an action id for `method`, or for every method when `None`.
    ///
    /// Returns the rejected id when the slot is already taken.
    pub fn insert(&mut self, method: Option<Method>, action_id: impl Into<String>) -> Result<(), String> {
        let action_id = action_id.into();
        match method {
            Some(method) => {
                if self.explicit.iter().any(|(m, _)| *m == method) {
                    return Err(action_id);
                }
                self.explicit.push((method, action_id));
            }
            None => {
                if self.any.is_some() {
                    return Err(action_id);
                }
                self.any = Some(action_id);
            }
        }
        Ok(())
    }

    /// Returns the action id serving `method`.
    #[must_use]
    pub fn lookup(&self, method: &Method) -> Option<&str> {
        self.explicit
            .iter()
            .find(|(m, _)| m == method)
            .map(|(_, id)| id.as_str())
            .or(self.any.as_deref())
    }

    /// Returns true when no action is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.explicit.is_empty() && self.any.is_none()
    }

    /// Lists explicitly registered methods in registration order.
    #[must_use]
    pub fn allowed_methods(&self) -> Vec<Method> {
        self.explicit.iter().map(|(m, _)| m.clone()).collect()
    }
}
