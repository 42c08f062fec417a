//! Route pattern parsing.

use thiserror::Error;

/// One compiled segment of a route pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Literal text that must match exactly.
    Static(String),
    /// Named capture of one path segment (`:id` or `{id}`).
    Param(String),
    /// Named capture of the remaining path (`*rest`). Must be last.
    Wildcard(String),
}

/// Error raised when a route pattern cannot be compiled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    /// A parameter or wildcard has no name.
    #[error("route pattern '{0}' has an unnamed parameter")]
    EmptyName(String),
    /// A wildcard appears before the final segment.
    #[error("route pattern '{0}' has a wildcard before its last segment")]
    WildcardNotLast(String),
    /// The same method and pattern were registered twice.
    #[error("route {method} {pattern} is registered more than once")]
    Duplicate {
        /// Method label (`ALL` for method-less routes).
        method: String,
        /// The conflicting pattern.
        pattern: String,
    },
}

/// Compiles a route pattern into segments.
pub(crate) fn parse(pattern: &str) -> Result<Vec<Segment>, PatternError> {
    let raw: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
    let mut segments = Vec::with_capacity(raw.len());

    for (i, part) in raw.iter().enumerate() {
        let segment = if let Some(name) = part.strip_prefix(':') {
            Segment::Param(name.to_string())
        } else if let Some(name) = part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
            Segment::Param(name.to_string())
        } else if let Some(name) = part.strip_prefix('*') {
            if i + 1 != raw.len() {
                return Err(PatternError::WildcardNotLast(pattern.to_string()));
            }
            Segment::Wildcard(name.to_string())
        } else {
            Segment::Static((*part).to_string())
        };

        if let Segment::Param(name) | Segment::Wildcard(name) = &segment {
            if name.is_empty() {
                return Err(PatternError::EmptyName(pattern.to_string()));
            }
        }
        segments.push(segment);
    }

    Ok(segments)
}

/// Joins a route prefix and a route path into a normalized pattern.
///
/// ```rust
/// use trellis_router::join_paths;
///
/// assert_eq!(join_paths("/api/", "/users/"), "/api/users");
/// assert_eq!(join_paths("", ""), "/");
/// ```
#[must_use]
pub fn join_paths(prefix: &str, path: &str) -> String {
    let joined: Vec<&str> = prefix
        .split('/')
        .chain(path.split('/'))
        .filter(|s| !s.is_empty())
        .collect();
    format!("/{}", joined.join("/"))
}
