//! # Trellis
//!
//! Controller-style action dispatch for Rust.
//!
//! Actions are registered explicitly on an [`ActionRegistry`](prelude::ActionRegistry),
//! each with its route, parameters and response rules. A driver carries
//! requests from a backend through one pipeline: routing, middleware,
//! authorization, parameter resolution, the handler, interceptors, and
//! response shaping.
//!
//! | Driver | Backend |
//! |---|---|
//! | [`GhostDriver`](prelude::GhostDriver) | in-process, no network |
//! | [`HyperDriver`](prelude::HyperDriver) | HTTP/1.1 over hyper |
//! | [`LambdaDriver`](prelude::LambdaDriver) | AWS API Gateway proxy events |
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use trellis::prelude::*;
//!
//! struct Users;
//!
//! impl Users {
//!     async fn show(self: Arc<Self>, id: i64) -> Result<Json<serde_json::Value>, ActionError> {
//!         Ok(Json(serde_json::json!({ "id": id })))
//!     }
//! }
//!
//! # tokio_test::block_on(async {
//! let registry = ActionRegistry::builder()
//!     .controller::<Users>("/users", |c| {
//!         c.get("/:id", Users::show)
//!             .arg(ParamMetadata::param("id").typed(ParamType::Integer));
//!     })
//!     .build()
//!     .unwrap();
//!
//! let mut container = Container::new();
//! container.register(Arc::new(Users));
//!
//! let app = Application::builder()
//!     .container(container.freeze())
//!     .registry(registry)
//!     .build()
//!     .unwrap();
//!
//! let response = app.ghost().unwrap().dispatch(GhostRequest::get("/users/7")).await.unwrap();
//! assert_eq!(response.json(), Some(&serde_json::json!({ "id": 7 })));
//! # });
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod app;

pub use app::{AppError, Application, ApplicationBuilder};

pub use trellis_config as config;
pub use trellis_core as core;
pub use trellis_dispatch as dispatch;
pub use trellis_lambda as lambda;
pub use trellis_router as router;
pub use trellis_server as server;
pub use trellis_telemetry as telemetry;

/// Common imports.
///
/// ```rust
/// use trellis::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{AppError, Application};

    pub use trellis_core::{
        middleware, Action, ActionError, ActionRegistry, ActionRequest, Container, HttpError, Interceptor, Json,
        Middleware, ParamMetadata, ParamType, Reply, TransformOptions,
    };

    pub use trellis_dispatch::{
        AuthorizationChecker, CurrentUserChecker, Driver, DriverOptions, ErrorHandler, GhostDriver, GhostRequest,
        GhostResponse,
    };

    pub use trellis_config::{ConfigLoader, TrellisConfig};
    pub use trellis_lambda::{LambdaContext, LambdaDriver};
    pub use trellis_server::{HyperDriver, ServerConfig, ShutdownSignal};
}
