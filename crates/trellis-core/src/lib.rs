//! # Trellis Core
//!
//! Core types for the Trellis action-dispatch framework.
//!
//! - [`ActionMetadata`] / [`ParamMetadata`] - static description of one controller action
//! - [`ActionRegistry`] - explicit, immutable registry built at assembly time
//! - [`Container`] - explicitly constructed service container with a freeze/dispose lifecycle
//! - [`Action`] - per-request envelope pairing the normalized request and response
//! - [`Reply`] - what a handler produced, before response shaping
//! - [`ActionError`] - closed error taxonomy of the dispatch pipeline
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use trellis_core::{ActionRegistry, ActionError, Container, Json, ParamMetadata};
//!
//! struct Greeter;
//!
//! impl Greeter {
//!     async fn hello(self: Arc<Self>, name: String) -> Result<Json<String>, ActionError> {
//!         Ok(Json(format!("hello {name}")))
//!     }
//! }
//!
//! let registry = ActionRegistry::builder()
//!     .controller::<Greeter>("/greet", |c| {
//!         c.get("/:name", Greeter::hello).arg(ParamMetadata::param("name"));
//!     })
//!     .build()
//!     .unwrap();
//!
//! let mut container = Container::new();
//! container.register(Arc::new(Greeter));
//! let container = container.freeze();
//!
//! assert_eq!(registry.len(), 1);
//! assert!(container.has::<Greeter>());
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod action;
mod cookie;
pub mod di;
mod error;
mod handler;
mod interceptor;
mod metadata;
pub mod middleware;
mod registry;
mod reply;

use std::future::Future;
use std::pin::Pin;

pub use action::{Action, ActionRequest, ActionResponse, RequestBody, RequestId, ResponseBody, UploadedFile};
pub use cookie::Cookies;
pub use di::{Container, InjectionError};
pub use error::{ActionError, ActionResult, ErrorBody, FieldError, HttpError};
pub use handler::{ActionHandler, Arg, Args, FromParam, Handler, ParamValue};
pub use interceptor::Interceptor;
pub use metadata::{
    ActionMetadata, ParamKind, ParamMetadata, ParamType, ParamValidator, ResponseKind,
    TransformOptions,
};
pub use middleware::{Endpoint, Middleware, Next};
pub use registry::{ActionBuilder, ActionRegistry, ControllerBuilder, RegistryBuilder, RegistryError};
pub use reply::{BodyStream, IntoReply, Json, Reply};
pub use trellis_router::Params;

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
