//! Route matching for Trellis.
//!
//! Action routes are written the way controller frameworks write them:
//! Express-style parameters (`/users/:id`), brace parameters
//! (`/users/{id}`) and trailing catch-alls (`/files/*path`). Patterns are
//! compiled into a segment trie and matched per request in a single walk.
//!
//! # Example
//!
//! ```rust
//! use trellis_router::RouteTable;
//! use http::Method;
//!
//! let mut table = RouteTable::new();
//! table.insert(Some(Method::GET), "/users/:id", "UserController.get_one").unwrap();
//! table.insert(Some(Method::POST), "/users", "UserController.create").unwrap();
//!
//! let found = table.match_route(&Method::GET, "/users/42").unwrap();
//! assert_eq!(found.action_id, "UserController.get_one");
//! assert_eq!(found.params.get("id"), Some("42"));
//! ```
//!
//! # Route Priority
//!
//! 1. **Static segments** (`/users/me`)
//! 2. **Parameter segments** (`/users/:id`)
//! 3. **Wildcard segments** (`/users/*rest`)

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod methods;
mod node;
mod params;
mod pattern;
mod table;

pub use methods::MethodSet;
pub use params::Params;
pub use pattern::{join_paths, PatternError, Segment};
pub use table::{RouteLookup, RouteMatch, RouteTable};
