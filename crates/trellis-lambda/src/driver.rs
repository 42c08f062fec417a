//! The Lambda driver.

use std::collections::BTreeMap;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use http::header::{CONTENT_TYPE, SET_COOKIE};
use http::HeaderMap;
use mime::Mime;
use serde_json::{Map, Value};
use trellis_core::{
    Action, ActionError, ActionRegistry, ActionRequest, ActionResponse, HttpError, Middleware, RequestBody,
    ResponseBody,
};
use trellis_dispatch::{DispatchResult, Dispatcher, Driver, DriverKind, DriverOptions};

use crate::error::LambdaResult;
use crate::events::{ApiGatewayEvent, ApiGatewayResponse, LambdaContext};

/// Runs API Gateway proxy events through the dispatch pipeline.
///
/// The driver owns no runtime loop; a host hands it each invocation's event
/// and context and returns the resulting response.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use serde_json::json;
/// use trellis_core::{ActionError, ActionRegistry, Container, Json};
/// use trellis_dispatch::DriverOptions;
/// use trellis_lambda::{LambdaContext, LambdaDriver};
///
/// struct Status;
///
/// impl Status {
///     async fn show(self: Arc<Self>) -> Result<Json<&'static str>, ActionError> {
///         Ok(Json("up"))
///     }
/// }
///
/// # tokio_test::block_on(async {
/// let registry = ActionRegistry::builder()
///     .controller::<Status>("/status", |c| {
///         c.get("/", Status::show);
///     })
///     .build()
///     .unwrap();
///
/// let mut container = Container::new();
/// container.register(Arc::new(Status));
/// let driver = LambdaDriver::ready(DriverOptions::builder(container.freeze()).build(), registry).unwrap();
///
/// let event = json!({
///     "version": "2.0",
///     "rawPath": "/status",
///     "requestContext": { "http": { "method": "GET" } }
/// });
/// let response = driver.handle_value(event, LambdaContext::new("req-1")).await.unwrap();
///
/// assert_eq!(response["statusCode"], 200);
/// assert_eq!(response["body"], "\"up\"");
/// # });
/// ```
pub struct LambdaDriver {
    dispatcher: Dispatcher,
}

impl LambdaDriver {
    /// Creates an uninitialized driver.
    pub fn new(options: Arc<DriverOptions>) -> Self {
        Self {
            dispatcher: Dispatcher::new(options),
        }
    }

    /// Creates a driver, initializes it and registers `registry`.
    pub fn ready(options: Arc<DriverOptions>, registry: ActionRegistry) -> DispatchResult<Self> {
        let mut driver = Self::new(options);
        driver.initialize()?;
        driver.register_routes(Arc::new(registry))?;
        Ok(driver)
    }

    /// Handles one invocation.
    ///
    /// The context is stored in the request extensions as [`LambdaContext`].
    pub async fn handle(&self, event: ApiGatewayEvent, context: LambdaContext) -> LambdaResult<ApiGatewayResponse> {
        let http_api = event.is_http_api();
        let incoming = event.into_incoming()?;

        tracing::debug!(
            request_id = %context.aws_request_id,
            method = %incoming.method,
            path = incoming.uri.path(),
            "lambda invocation"
        );

        let request = ActionRequest::new(incoming.method, incoming.uri)
            .with_headers(incoming.headers)
            .with_extension(context);
        let mut action = Action::new(request);

        let content_type = action.request.header("content-type").map(str::to_owned);
        match parse_body(content_type.as_deref(), incoming.body) {
            Ok(body) => {
                action.request.body = body;
                self.dispatcher.dispatch(self, &mut action).await?;
            }
            Err(error) => self.handle_error(&mut action, error, None),
        }

        Ok(into_response(action, http_api).await)
    }

    /// Handles one invocation given as raw JSON, returning raw JSON.
    pub async fn handle_value(&self, event: Value, context: LambdaContext) -> LambdaResult<Value> {
        let event: ApiGatewayEvent = serde_json::from_value(event)?;
        let response = self.handle(event, context).await?;
        Ok(serde_json::to_value(response)?)
    }
}

impl Driver for LambdaDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Lambda
    }

    fn options(&self) -> &DriverOptions {
        self.dispatcher.options()
    }

    fn initialize(&mut self) -> DispatchResult<()> {
        self.dispatcher.initialize(DriverKind::Lambda)
    }

    fn register_middleware(&mut self, middleware: Arc<dyn Middleware>) {
        self.dispatcher.register_middleware(middleware);
    }

    fn register_routes(&mut self, registry: Arc<ActionRegistry>) -> DispatchResult<()> {
        self.dispatcher.register_routes(registry)
    }
}

fn parse_body(content_type: Option<&str>, bytes: Bytes) -> Result<RequestBody, ActionError> {
    if bytes.is_empty() {
        return Ok(RequestBody::Empty);
    }
    let Some(mime) = content_type.and_then(|ct| ct.parse::<Mime>().ok()) else {
        return Ok(RequestBody::Raw(bytes));
    };

    if mime.subtype() == mime::JSON || mime.suffix() == Some(mime::JSON) {
        return serde_json::from_slice(&bytes)
            .map(RequestBody::Json)
            .map_err(|err| HttpError::bad_request(format!("invalid JSON body: {err}")).with_source(err).into());
    }

    if mime.type_() == mime::APPLICATION && mime.subtype() == mime::WWW_FORM_URLENCODED {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(&bytes)
            .map_err(|err| HttpError::bad_request(format!("invalid form body: {err}")).with_source(err))?;
        let mut form = Map::new();
        for (name, value) in pairs {
            match form.get_mut(&name) {
                Some(Value::Array(values)) => values.push(Value::String(value)),
                Some(existing) => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, Value::String(value)]);
                }
                None => {
                    form.insert(name, Value::String(value));
                }
            }
        }
        return Ok(RequestBody::Form(form));
    }

    if mime.type_() == mime::TEXT {
        return Ok(RequestBody::Text(String::from_utf8_lossy(&bytes).into_owned()));
    }

    Ok(RequestBody::Raw(bytes))
}

async fn into_response(action: Action, http_api: bool) -> ApiGatewayResponse {
    let ActionResponse { status, headers, body } = action.response;

    let (body, is_base64_encoded) = match body {
        ResponseBody::Empty | ResponseBody::Null => (String::new(), false),
        ResponseBody::Json(value) => (value.to_string(), false),
        ResponseBody::Text(text) => (text, false),
        ResponseBody::Bytes(bytes) => encode_binary(&headers, bytes),
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
            encode_binary(&headers, collected.freeze())
        }
    };

    let mut single = BTreeMap::new();
    let mut multi: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut cookies = Vec::new();
    for (name, value) in &headers {
        let Ok(value) = value.to_str() else {
            continue;
        };
        if http_api && name == SET_COOKIE {
            cookies.push(value.to_string());
            continue;
        }
        multi.entry(name.as_str().to_string()).or_default().push(value.to_string());
    }
    for (name, values) in &multi {
        single.insert(name.clone(), values.join(","));
    }

    ApiGatewayResponse {
        status_code: status.as_u16(),
        headers: single,
        multi_value_headers: multi,
        body,
        is_base64_encoded,
        cookies,
    }
}

/// Textual payloads pass through; everything else is base64-encoded.
fn encode_binary(headers: &HeaderMap, bytes: Bytes) -> (String, bool) {
    let textual = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<Mime>().ok())
        .is_some_and(|mime| {
            mime.type_() == mime::TEXT
                || mime.subtype() == mime::JSON
                || mime.subtype() == mime::XML
                || mime.subtype() == mime::JAVASCRIPT
                || mime.suffix() == Some(mime::JSON)
                || mime.suffix() == Some(mime::XML)
        });

    if textual {
        if let Ok(text) = std::str::from_utf8(&bytes) {
            return (text.to_string(), false);
        }
    }
    (STANDARD.encode(&bytes), true)
}
