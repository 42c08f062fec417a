//! In-process driver.
//!
//! [`GhostDriver`] dispatches [`GhostRequest`]s straight into the pipeline
//! with no network, socket or serialization in between. It backs tests and
//! embedding hosts that already own their transport.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use http::StatusCode;
//! use trellis_core::{ActionError, ActionRegistry, Container, Json, ParamMetadata};
//! use trellis_dispatch::{DriverOptions, GhostDriver, GhostRequest};
//!
//! struct Echo;
//!
//! impl Echo {
//!     async fn echo(self: Arc<Self>, word: String) -> Result<Json<String>, ActionError> {
//!         Ok(Json(word))
//!     }
//! }
//!
//! # tokio_test::block_on(async {
//! let registry = ActionRegistry::builder()
//!     .controller::<Echo>("/echo", |c| {
//!         c.get("/:word", Echo::echo).arg(ParamMetadata::param("word"));
//!     })
//!     .build()
//!     .unwrap();
//!
//! let mut container = Container::new();
//! container.register(Arc::new(Echo));
//!
//! let driver = GhostDriver::ready(DriverOptions::builder(container.freeze()).build(), registry).unwrap();
//! let response = driver.dispatch(GhostRequest::get("/echo/hi")).await.unwrap();
//!
//! assert_eq!(response.status, StatusCode::OK);
//! assert_eq!(response.json(), Some(&serde_json::json!("hi")));
//! # });
//! ```

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use serde_json::{Map, Value};
use trellis_core::{Action, ActionRegistry, ActionRequest, Middleware, RequestBody, ResponseBody, UploadedFile};

use crate::dispatcher::Dispatcher;
use crate::driver::{Driver, DriverKind};
use crate::error::{DispatchError, DispatchResult};
use crate::options::DriverOptions;

/// A request handed to the ghost driver.
#[derive(Debug, Clone)]
#[must_use]
pub struct GhostRequest {
    /// Request method.
    pub method: Method,
    /// Path and query string.
    pub path: String,
    /// Request headers.
    pub headers: HeaderMap,
    /// Parsed body.
    pub body: RequestBody,
    /// Uploaded files.
    pub files: Vec<UploadedFile>,
    /// Session data.
    pub session: Option<Map<String, Value>>,
}

impl GhostRequest {
    /// Creates a request.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
            files: Vec::new(),
            session: None,
        }
    }

    /// A GET request.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// A POST request.
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// A PUT request.
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    /// A DELETE request.
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Adds a header. Invalid names or values are ignored.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            self.headers.append(name, value);
        }
        self
    }

    /// Sets a JSON body.
    pub fn json(mut self, body: Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    /// Sets a text body.
    pub fn text(mut self, body: impl Into<String>) -> Self {
        self.body = RequestBody::Text(body.into());
        self
    }

    /// Adds an uploaded file.
    pub fn file(mut self, file: UploadedFile) -> Self {
        self.files.push(file);
        self
    }

    /// Sets the session.
    pub fn session(mut self, session: Map<String, Value>) -> Self {
        self.session = Some(session);
        self
    }

    fn into_action(self) -> DispatchResult<Action> {
        let uri: Uri = self
            .path
            .parse()
            .map_err(|err: http::uri::InvalidUri| DispatchError::InvalidRequest(err.to_string()))?;

        let mut request = ActionRequest::new(self.method, uri)
            .with_headers(self.headers)
            .with_body(self.body);
        request.files = self.files;
        request.session = self.session;
        Ok(Action::new(request))
    }
}

/// Body of a [`GhostResponse`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GhostBody {
    /// No payload.
    Empty,
    /// JSON `null`.
    Null,
    /// A JSON document.
    Json(Value),
    /// Text or HTML.
    Text(String),
    /// Raw bytes, including collected streams.
    Bytes(Bytes),
}

/// A response produced by the ghost driver.
#[derive(Debug, Clone)]
pub struct GhostResponse {
    /// Status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body.
    pub body: GhostBody,
}

impl GhostResponse {
    /// The JSON body, if any.
    pub fn json(&self) -> Option<&Value> {
        match &self.body {
            GhostBody::Json(value) => Some(value),
            _ => None,
        }
    }

    /// The text body, if any.
    pub fn text(&self) -> Option<&str> {
        match &self.body {
            GhostBody::Text(text) => Some(text),
            _ => None,
        }
    }

    /// A header value as a string.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    async fn from_action(action: Action) -> Self {
        let response = action.response;
        let body = match response.body {
            ResponseBody::Empty => GhostBody::Empty,
            ResponseBody::Null => GhostBody::Null,
            ResponseBody::Json(value) => GhostBody::Json(value),
            ResponseBody::Text(text) => GhostBody::Text(text),
            ResponseBody::Bytes(bytes) => GhostBody::Bytes(bytes),
            ResponseBody::Stream(mut stream) => {
                let mut collected = BytesMut::new();
                while let Some(chunk) = stream.next().await {
                    match chunk {
                        Ok(chunk) => collected.extend_from_slice(&chunk),
                        Err(err) => {
                            tracing::warn!(error = %err, "response stream failed");
                            break;
                        }
                    }
                }
                GhostBody::Bytes(collected.freeze())
            }
        };
        Self {
            status: response.status,
            headers: response.headers,
            body,
        }
    }
}

/// Driver that dispatches in-process requests.
pub struct GhostDriver {
    dispatcher: Dispatcher,
}

impl GhostDriver {
    /// Creates an uninitialized driver.
    pub fn new(options: Arc<DriverOptions>) -> Self {
        Self {
            dispatcher: Dispatcher::new(options),
        }
    }

    /// Creates, initializes and routes a driver in one step.
    pub fn ready(options: Arc<DriverOptions>, registry: ActionRegistry) -> DispatchResult<Self> {
        let mut driver = Self::new(options);
        driver.initialize()?;
        driver.register_routes(Arc::new(registry))?;
        Ok(driver)
    }

    /// Dispatches one request.
    pub async fn dispatch(&self, request: GhostRequest) -> DispatchResult<GhostResponse> {
        let mut action = request.into_action()?;
        self.dispatcher.dispatch(self, &mut action).await?;
        Ok(GhostResponse::from_action(action).await)
    }
}

impl Driver for GhostDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Ghost
    }

    fn options(&self) -> &DriverOptions {
        self.dispatcher.options()
    }

    fn initialize(&mut self) -> DispatchResult<()> {
        self.dispatcher.initialize(DriverKind::Ghost)
    }

    fn register_middleware(&mut self, middleware: Arc<dyn Middleware>) {
        self.dispatcher.register_middleware(middleware);
    }

    fn register_routes(&mut self, registry: Arc<ActionRegistry>) -> DispatchResult<()> {
        self.dispatcher.register_routes(registry)
    }
}
