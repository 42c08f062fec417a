//! The hyper HTTP driver.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::TryStreamExt;
use http::{Request, Response, StatusCode};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::{Body, Frame, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream};
use trellis_core::{
    Action, ActionError, ActionRegistry, ActionRequest, ActionResponse, HttpError, Middleware, ResponseBody,
};
use trellis_dispatch::{DispatchError, DispatchResult, Dispatcher, Driver, DriverKind, DriverOptions};

use crate::body;
use crate::config::ServerConfig;
use crate::error::{BodyError, ServerError};
use crate::shutdown::{ConnectionTracker, ShutdownSignal};

/// Response body type written by the driver.
pub type HttpBody = BoxBody<Bytes, std::io::Error>;

/// The client address of a connection, stored in request extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteAddr(pub SocketAddr);

/// Serves the dispatch pipeline over HTTP/1.1.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use trellis_core::{ActionError, ActionRegistry, Container, Json};
/// use trellis_dispatch::{Driver, DriverOptions};
/// use trellis_server::{HyperDriver, ServerConfig};
///
/// struct Health;
///
/// impl Health {
///     async fn check(self: Arc<Self>) -> Result<Json<&'static str>, ActionError> {
///         Ok(Json("ok"))
///     }
/// }
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let registry = ActionRegistry::builder()
///         .controller::<Health>("/health", |c| {
///             c.get("/", Health::check);
///         })
///         .build()?;
///
///     let mut container = trellis_core::Container::new();
///     container.register(Arc::new(Health));
///
///     let options = DriverOptions::builder(container.freeze()).build();
///     let mut driver = HyperDriver::new(options, ServerConfig::builder().http_addr("127.0.0.1:8080").build());
///     driver.initialize()?;
///     driver.register_routes(Arc::new(registry))?;
///     driver.run().await?;
///     Ok(())
/// }
/// ```
pub struct HyperDriver {
    dispatcher: Dispatcher,
    config: ServerConfig,
}

impl HyperDriver {
    /// Creates an uninitialized driver.
    pub fn new(options: Arc<DriverOptions>, config: ServerConfig) -> Self {
        Self {
            dispatcher: Dispatcher::new(options),
            config,
        }
    }

    /// Creates a driver, initializes it and registers `registry`.
    pub fn ready(options: Arc<DriverOptions>, config: ServerConfig, registry: ActionRegistry) -> DispatchResult<Self> {
        let mut driver = Self::new(options, config);
        driver.initialize()?;
        driver.register_routes(Arc::new(registry))?;
        Ok(driver)
    }

    /// Server settings.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Serves until SIGTERM or SIGINT.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid or cannot be bound.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_with_shutdown(ShutdownSignal::with_os_signals()).await
    }

    /// Binds the configured address and serves until `shutdown` fires.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid or cannot be bound.
    pub async fn run_with_shutdown(self, shutdown: ShutdownSignal) -> Result<(), ServerError> {
        let addr = self.config.socket_addr().map_err(|source| ServerError::InvalidAddress {
            addr: self.config.http_addr().to_string(),
            source,
        })?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        self.serve(listener, shutdown).await
    }

    /// Serves connections from `listener` until `shutdown` fires, then
    /// drains open connections and disposes the container.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::NotInitialized`] if the driver was never initialized.
    pub async fn serve(self, listener: TcpListener, shutdown: ShutdownSignal) -> Result<(), ServerError> {
        if !self.dispatcher.is_initialized() {
            return Err(DispatchError::NotInitialized.into());
        }

        if let Ok(addr) = listener.local_addr() {
            tracing::info!(%addr, routes = self.dispatcher.routes().len(), "server listening");
        }

        let driver = Arc::new(self);
        let tracker = ConnectionTracker::new();

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, remote)) => {
                        let driver = Arc::clone(&driver);
                        let token = tracker.acquire();
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            if let Err(err) = driver.serve_connection(stream, remote, shutdown).await {
                                tracing::debug!(%remote, error = %err, "connection ended with error");
                            }
                            drop(token);
                        });
                    }
                    Err(err) => tracing::error!(error = %err, "failed to accept connection"),
                },
                () = shutdown.recv() => {
                    tracing::info!("shutdown signal received, no longer accepting connections");
                    break;
                }
            }
        }

        let timeout = driver.config.shutdown_timeout();
        tracing::info!(active = tracker.active_connections(), ?timeout, "draining connections");
        if tokio::time::timeout(timeout, tracker.wait_idle()).await.is_err() {
            tracing::warn!(active = tracker.active_connections(), "shutdown timeout reached with connections open");
        }

        driver.options().container.dispose();
        tracing::info!("server stopped");
        Ok(())
    }

    async fn serve_connection(
        self: Arc<Self>,
        stream: TcpStream,
        remote: SocketAddr,
        shutdown: ShutdownSignal,
    ) -> Result<(), hyper::Error> {
        let io = TokioIo::new(stream);
        let driver = Arc::clone(&self);
        let service = service_fn(move |mut request: Request<Incoming>| {
            let driver = Arc::clone(&driver);
            request.extensions_mut().insert(RemoteAddr(remote));
            async move { Ok::<_, Infallible>(driver.handle(request).await) }
        });

        let connection = http1::Builder::new()
            .keep_alive(self.config.keep_alive())
            .serve_connection(io, service);
        tokio::pin!(connection);

        tokio::select! {
            result = connection.as_mut() => result,
            () = shutdown.recv() => {
                tracing::debug!(%remote, "closing connection for shutdown");
                connection.as_mut().graceful_shutdown();
                connection.await
            }
        }
    }

    /// Runs one HTTP request through the pipeline.
    pub async fn handle<B>(&self, request: Request<B>) -> Response<HttpBody>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let (parts, payload) = request.into_parts();
        let mut action = Action::new(ActionRequest::new(parts.method, parts.uri).with_headers(parts.headers));
        action.request.extensions = parts.extensions;

        let content_type = action.request.header("content-type").map(str::to_owned);
        let parsed = match body::read(payload, self.config.max_body_bytes()).await {
            Ok(bytes) => body::parse(content_type.as_deref(), bytes).await,
            Err(err) => Err(err),
        };

        match parsed {
            Ok(parsed) => {
                action.request.body = parsed.body;
                action.request.files = parsed.files;
                self.dispatch(&mut action).await;
            }
            Err(err) => self.handle_error(&mut action, body_error(err), None),
        }

        into_response(action)
    }

    async fn dispatch(&self, action: &mut Action) {
        let outcome = match self.config.request_timeout() {
            Some(limit) => tokio::time::timeout(limit, self.dispatcher.dispatch(self, action))
                .await
                .ok(),
            None => Some(self.dispatcher.dispatch(self, action).await),
        };

        match outcome {
            Some(Ok(())) => {}
            Some(Err(err)) => {
                tracing::error!(error = %err, "dispatch failed");
                let error = HttpError::internal(err.to_string()).with_source(err);
                self.handle_error(action, error.into(), None);
            }
            None => {
                tracing::warn!(method = %action.request.method, path = action.request.path(), "request timed out");
                action.response = ActionResponse::default();
                let error = HttpError::new(StatusCode::GATEWAY_TIMEOUT, "Request timed out").with_name("GatewayTimeoutError");
                self.handle_error(action, error.into(), None);
            }
        }
    }
}

impl Driver for HyperDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Hyper
    }

    fn options(&self) -> &DriverOptions {
        self.dispatcher.options()
    }

    fn initialize(&mut self) -> DispatchResult<()> {
        self.dispatcher.initialize(DriverKind::Hyper)
    }

    fn register_middleware(&mut self, middleware: Arc<dyn Middleware>) {
        self.dispatcher.register_middleware(middleware);
    }

    fn register_routes(&mut self, registry: Arc<ActionRegistry>) -> DispatchResult<()> {
        self.dispatcher.register_routes(registry)
    }
}

fn body_error(err: BodyError) -> ActionError {
    let error = match &err {
        BodyError::TooLarge { .. } => {
            HttpError::new(StatusCode::PAYLOAD_TOO_LARGE, err.to_string()).with_name("PayloadTooLargeError")
        }
        _ => HttpError::bad_request(err.to_string()),
    };
    error.with_source(err).into()
}

fn full(bytes: impl Into<Bytes>) -> HttpBody {
    Full::new(bytes.into()).map_err(|never| match never {}).boxed()
}

fn into_response(action: Action) -> Response<HttpBody> {
    let ActionResponse { status, headers, body } = action.response;

    let body = match body {
        ResponseBody::Empty | ResponseBody::Null => full(Bytes::new()),
        ResponseBody::Json(value) => match serde_json::to_vec(&value) {
            Ok(encoded) => full(encoded),
            Err(err) => {
                tracing::error!(error = %err, "failed to encode JSON response");
                full(Bytes::new())
            }
        },
        ResponseBody::Text(text) => full(text),
        ResponseBody::Bytes(bytes) => full(bytes),
        ResponseBody::Stream(stream) => StreamBody::new(stream.map_ok(Frame::data)).boxed(),
    };

    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use serde_json::{json, Value};
    use trellis_core::{Container, Json, ParamMetadata};

    struct Notes;

    impl Notes {
        async fn create(self: Arc<Self>, note: Value) -> Result<Json<Value>, ActionError> {
            Ok(Json(json!({ "saved": note })))
        }

        async fn lookup(self: Arc<Self>) -> Result<Option<Json<Value>>, ActionError> {
            Ok(None)
        }

        async fn slow(self: Arc<Self>) -> Result<Json<&'static str>, ActionError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Json("late"))
        }
    }

    fn driver(config: ServerConfig) -> HyperDriver {
        let registry = ActionRegistry::builder()
            .controller::<Notes>("/notes", |c| {
                c.post("/", Notes::create).arg(ParamMetadata::body());
                c.get("/slow", Notes::slow);
                c.get("/lookup", Notes::lookup).on_null(StatusCode::NOT_FOUND);
                c.get("/empty", Notes::lookup);
            })
            .build()
            .unwrap();

        let mut container = Container::new();
        container.register(Arc::new(Notes));
        HyperDriver::ready(DriverOptions::builder(container.freeze()).build(), config, registry).unwrap()
    }

    fn post(body: &'static str, content_type: &str) -> Request<Full<Bytes>> {
        Request::post("/notes")
            .header("content-type", content_type)
            .body(Full::new(Bytes::from_static(body.as_bytes())))
            .unwrap()
    }

    async fn read_json(response: Response<HttpBody>) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_json_request() {
        let driver = driver(ServerConfig::default());
        let response = driver.handle(post(r#"{"text":"hi"}"#, "application/json")).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "application/json");
        assert_eq!(read_json(response).await, json!({ "saved": { "text": "hi" } }));
    }

    #[tokio::test]
    async fn test_form_request() {
        let driver = driver(ServerConfig::default());
        let response = driver
            .handle(post("text=hi&tag=a&tag=b", "application/x-www-form-urlencoded"))
            .await;

        assert_eq!(
            read_json(response).await,
            json!({ "saved": { "text": "hi", "tag": ["a", "b"] } })
        );
    }

    #[tokio::test]
    async fn test_malformed_json_is_bad_request() {
        let driver = driver(ServerConfig::default());
        let response = driver.handle(post("{oops", "application/json")).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(read_json(response).await["name"], "BadRequestError");
    }

    #[tokio::test]
    async fn test_body_limit() {
        let driver = driver(ServerConfig::builder().max_body_bytes(4).build());
        let response = driver.handle(post(r#"{"text":"too long"}"#, "application/json")).await;

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(read_json(response).await["name"], "PayloadTooLargeError");
    }

    #[tokio::test]
    async fn test_request_timeout() {
        let driver = driver(
            ServerConfig::builder()
                .request_timeout(Some(Duration::from_millis(20)))
                .build(),
        );
        let request = Request::get("/notes/slow").body(Full::new(Bytes::new())).unwrap();
        let response = driver.handle(request).await;

        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(read_json(response).await["name"], "GatewayTimeoutError");
    }

    #[tokio::test]
    async fn test_null_result_body() {
        let driver = driver(ServerConfig::default());

        let request = Request::get("/notes/lookup").body(Full::new(Bytes::new())).unwrap();
        let response = driver.handle(request).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()["content-type"], "application/json");
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"null");

        let request = Request::get("/notes/empty").body(Full::new(Bytes::new())).unwrap();
        let response = driver.handle(request).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(response.into_body().collect().await.unwrap().to_bytes().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let driver = driver(ServerConfig::default());
        let request = Request::get("/missing").body(Full::new(Bytes::new())).unwrap();
        let response = driver.handle(request).await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(read_json(response).await["message"], "Cannot GET /missing");
    }

    #[tokio::test]
    async fn test_serve_requires_initialize() {
        let driver = HyperDriver::new(DriverOptions::empty(), ServerConfig::default());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

        let err = driver.serve(listener, ShutdownSignal::new()).await.unwrap_err();
        assert!(matches!(err, ServerError::Dispatch(DispatchError::NotInitialized)));
    }
}
