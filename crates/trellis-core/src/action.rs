//! The per-request action envelope.
//!
//! Drivers translate their native request into an [`ActionRequest`], run the
//! pipeline over an [`Action`], and translate the resulting
//! [`ActionResponse`] back. Nothing in an action outlives the request.

use std::fmt;

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::{Extensions, HeaderMap, Method, StatusCode, Uri};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use trellis_router::Params;
use uuid::Uuid;

use crate::cookie::Cookies;
use crate::reply::BodyStream;

/// Unique request identifier (UUID v7, time-ordered).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Creates a fresh id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// The underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for RequestId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Parsed request body.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RequestBody {
    /// No body was sent.
    #[default]
    Empty,
    /// `application/json`.
    Json(Value),
    /// `text/*`.
    Text(String),
    /// `application/x-www-form-urlencoded` or the text fields of a multipart form.
    Form(Map<String, Value>),
    /// Anything else.
    Raw(Bytes),
}

impl RequestBody {
    /// The body as a JSON value, or `None` when nothing was sent.
    pub fn to_value(&self) -> Option<Value> {
        match self {
            Self::Empty => None,
            Self::Json(value) => Some(value.clone()),
            Self::Text(text) => Some(Value::String(text.clone())),
            Self::Form(map) => Some(Value::Object(map.clone())),
            Self::Raw(bytes) => Some(Value::String(String::from_utf8_lossy(bytes).into_owned())),
        }
    }

    /// One field of an object body.
    pub fn field(&self, name: &str) -> Option<Value> {
        match self {
            Self::Json(Value::Object(map)) | Self::Form(map) => map.get(name).cloned(),
            _ => None,
        }
    }
}

/// A file received in a multipart upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    /// Form field the file was sent under.
    pub field_name: String,
    /// Client-side file name.
    pub file_name: Option<String>,
    /// Declared content type.
    pub content_type: Option<String>,
    /// File contents.
    pub data: Bytes,
}

impl UploadedFile {
    /// Creates an uploaded file.
    pub fn new(field_name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            field_name: field_name.into(),
            file_name: None,
            content_type: None,
            data: data.into(),
        }
    }

    /// Sets the client-side file name.
    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    /// Sets the content type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True for empty files.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// A backend-neutral request.
///
/// # Example
///
/// ```rust
/// use http::Method;
/// use serde_json::json;
/// use trellis_core::{ActionRequest, RequestBody};
///
/// let request = ActionRequest::new(Method::POST, "/users?role=admin".parse().unwrap())
///     .with_header("content-type", "application/json")
///     .with_body(RequestBody::Json(json!({ "name": "Ada" })));
///
/// assert_eq!(request.url(), "/users?role=admin");
/// assert_eq!(request.query_value("role"), Some(json!("admin")));
/// ```
#[derive(Debug, Clone)]
pub struct ActionRequest {
    /// Request id.
    pub id: RequestId,
    /// HTTP method.
    pub method: Method,
    /// Request URI (path and query).
    pub uri: Uri,
    /// Path parameters, filled in by routing.
    pub params: Params,
    /// Query pairs in arrival order.
    pub query: Vec<(String, String)>,
    /// Request headers.
    pub headers: HeaderMap,
    /// Parsed body.
    pub body: RequestBody,
    /// Uploaded files.
    pub files: Vec<UploadedFile>,
    /// Session data, when a session is attached.
    pub session: Option<Map<String, Value>>,
    /// Backend-specific values (e.g. a Lambda context).
    pub extensions: Extensions,
}

impl ActionRequest {
    /// Creates a request; the query string is parsed from `uri`.
    pub fn new(method: Method, uri: Uri) -> Self {
        let query = uri.query().map(parse_query).unwrap_or_default();
        Self {
            id: RequestId::new(),
            method,
            uri,
            params: Params::new(),
            query,
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
            files: Vec::new(),
            session: None,
            extensions: Extensions::new(),
        }
    }

    /// Appends a header. Invalid names or values are ignored.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    /// Replaces the headers.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Sets the body.
    pub fn with_body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    /// Adds an uploaded file.
    pub fn with_file(mut self, file: UploadedFile) -> Self {
        self.files.push(file);
        self
    }

    /// Attaches a session.
    pub fn with_session(mut self, session: Map<String, Value>) -> Self {
        self.session = Some(session);
        self
    }

    /// Stores a backend-specific value.
    pub fn with_extension<T: Clone + Send + Sync + 'static>(mut self, value: T) -> Self {
        self.extensions.insert(value);
        self
    }

    /// Path plus query string, as the client sent it.
    pub fn url(&self) -> String {
        self.uri
            .path_and_query()
            .map_or_else(|| self.uri.path().to_string(), ToString::to_string)
    }

    /// Request path.
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Cookies from the `Cookie` headers.
    pub fn cookies(&self) -> Cookies {
        Cookies::from_headers(&self.headers)
    }

    /// One header as a string (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name.to_ascii_lowercase().as_str())
            .and_then(|v| v.to_str().ok())
    }

    /// One query value: a string, or an array when the key repeats.
    pub fn query_value(&self, name: &str) -> Option<Value> {
        let values: Vec<&str> = self
            .query
            .iter()
            .filter(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .collect();
        match values.as_slice() {
            [] => None,
            [single] => Some(Value::String((*single).to_string())),
            many => Some(Value::Array(
                many.iter().map(|v| Value::String((*v).to_string())).collect(),
            )),
        }
    }

    /// The whole query string as an object.
    pub fn query_object(&self) -> Value {
        let mut map = Map::new();
        for (key, _) in &self.query {
            if !map.contains_key(key) {
                if let Some(value) = self.query_value(key) {
                    map.insert(key.clone(), value);
                }
            }
        }
        Value::Object(map)
    }

    /// All headers as an object keyed by lowercase name.
    pub fn headers_object(&self) -> Value {
        let mut map = Map::new();
        for (name, value) in &self.headers {
            if let Ok(value) = value.to_str() {
                map.entry(name.as_str().to_string())
                    .or_insert_with(|| Value::String(value.to_string()));
            }
        }
        Value::Object(map)
    }
}

fn parse_query(query: &str) -> Vec<(String, String)> {
    serde_urlencoded::from_str::<Vec<(String, String)>>(query).unwrap_or_default()
}

/// Body written back to the client.
#[derive(Default)]
pub enum ResponseBody {
    /// Nothing.
    #[default]
    Empty,
    /// A null result sent without a payload.
    Null,
    /// A JSON document.
    Json(Value),
    /// Plain text or HTML.
    Text(String),
    /// Raw bytes, written as-is.
    Bytes(Bytes),
    /// A streamed body, written as-is.
    Stream(BodyStream),
}

impl ResponseBody {
    /// The JSON document, if the body is one.
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    /// True when no payload is written.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Null => f.write_str("Null"),
            Self::Json(value) => f.debug_tuple("Json").field(value).finish(),
            Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Self::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// A backend-neutral response under construction.
#[derive(Debug, Default)]
pub struct ActionResponse {
    /// Status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body.
    pub body: ResponseBody,
}

impl ActionResponse {
    /// Merges `headers` in, replacing same-named entries.
    pub fn merge_headers(&mut self, headers: &HeaderMap) {
        for name in headers.keys() {
            self.headers.remove(name);
            for value in headers.get_all(name) {
                self.headers.append(name.clone(), value.clone());
            }
        }
    }

    /// Sets `content-type` unless one is already present.
    pub fn default_content_type(&mut self, value: &'static str) {
        self.headers
            .entry(http::header::CONTENT_TYPE)
            .or_insert(HeaderValue::from_static(value));
    }
}

/// One request's trip through the pipeline.
#[derive(Debug)]
pub struct Action {
    /// The normalized request.
    pub request: ActionRequest,
    /// The response being built.
    pub response: ActionResponse,
    /// Set once an error has been reported to the custom error handler.
    pub error_handled: bool,
}

impl Action {
    /// Wraps a request with an empty 200 response.
    pub fn new(request: ActionRequest) -> Self {
        Self {
            request,
            response: ActionResponse::default(),
            error_handled: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(uri: &str) -> ActionRequest {
        ActionRequest::new(Method::GET, uri.parse().unwrap())
    }

    #[test]
    fn test_query_value_single_and_repeated() {
        let req = request("/search?tag=a&tag=b&q=rust%20lang");
        assert_eq!(req.query_value("q"), Some(json!("rust lang")));
        assert_eq!(req.query_value("tag"), Some(json!(["a", "b"])));
        assert_eq!(req.query_value("missing"), None);
        assert_eq!(
            req.query_object(),
            json!({ "tag": ["a", "b"], "q": "rust lang" })
        );
    }

    #[test]
    fn test_header_case_insensitive() {
        let req = request("/").with_header("X-Request-Token", "abc");
        assert_eq!(req.header("x-request-token"), Some("abc"));
        assert_eq!(req.header("X-REQUEST-TOKEN"), Some("abc"));
        assert_eq!(req.headers_object(), json!({ "x-request-token": "abc" }));
    }

    #[test]
    fn test_cookies_from_headers() {
        let req = request("/").with_header("cookie", "sid=42");
        assert_eq!(req.cookies().get("sid"), Some("42"));
    }

    #[test]
    fn test_body_field() {
        let body = RequestBody::Json(json!({ "name": "Ada" }));
        assert_eq!(body.field("name"), Some(json!("Ada")));
        assert_eq!(body.field("age"), None);
        assert_eq!(RequestBody::Empty.to_value(), None);
    }

    #[test]
    fn test_merge_headers_replaces() {
        let mut response = ActionResponse::default();
        response
            .headers
            .insert("x-a", HeaderValue::from_static("old"));

        let mut extra = HeaderMap::new();
        extra.insert("x-a", HeaderValue::from_static("new"));
        extra.insert("x-b", HeaderValue::from_static("b"));
        response.merge_headers(&extra);

        assert_eq!(response.headers["x-a"], "new");
        assert_eq!(response.headers["x-b"], "b");
    }

    #[test]
    fn test_url_includes_query() {
        assert_eq!(request("/a/b?c=d").url(), "/a/b?c=d");
        assert_eq!(request("/a").url(), "/a");
    }
}
