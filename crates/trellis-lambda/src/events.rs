//! API Gateway proxy event and response models.
//!
//! Both payload formats are accepted: HTTP API (format 2.0) and REST API
//! (format 1.0). [`ApiGatewayEvent`] tells them apart by shape.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, COOKIE};
use http::{HeaderMap, Method, Uri};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::LambdaError;

/// An API Gateway proxy event.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ApiGatewayEvent {
    /// HTTP API, payload format 2.0.
    Http(HttpApiEvent),
    /// REST API, payload format 1.0.
    Rest(RestApiEvent),
}

/// HTTP API (payload format 2.0) event.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpApiEvent {
    /// Payload version, `"2.0"`.
    #[serde(default)]
    pub version: Option<String>,
    /// Request path.
    pub raw_path: String,
    /// Query string without the leading `?`.
    #[serde(default)]
    pub raw_query_string: String,
    /// Headers; repeated headers arrive comma-joined.
    #[serde(default)]
    pub headers: Option<BTreeMap<String, String>>,
    /// Cookies, split out of the `Cookie` header.
    #[serde(default)]
    pub cookies: Option<Vec<String>>,
    /// Request context.
    pub request_context: HttpApiRequestContext,
    /// Body, possibly base64-encoded.
    #[serde(default)]
    pub body: Option<String>,
    /// Whether `body` is base64-encoded.
    #[serde(default)]
    pub is_base64_encoded: bool,
}

/// Request context of an HTTP API event.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpApiRequestContext {
    /// Method and source details.
    pub http: HttpApiDescription,
    /// API Gateway request id.
    #[serde(default)]
    pub request_id: Option<String>,
}

/// The `requestContext.http` block.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpApiDescription {
    /// HTTP method.
    pub method: String,
    /// Client address.
    #[serde(default)]
    pub source_ip: Option<String>,
}

/// REST API (payload format 1.0) event.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestApiEvent {
    /// HTTP method.
    pub http_method: String,
    /// Request path.
    pub path: String,
    /// Single-value headers.
    #[serde(default)]
    pub headers: Option<BTreeMap<String, String>>,
    /// Multi-value headers; preferred when present.
    #[serde(default)]
    pub multi_value_headers: Option<BTreeMap<String, Vec<String>>>,
    /// Single-value query parameters.
    #[serde(default)]
    pub query_string_parameters: Option<BTreeMap<String, String>>,
    /// Multi-value query parameters; preferred when present.
    #[serde(default)]
    pub multi_value_query_string_parameters: Option<BTreeMap<String, Vec<String>>>,
    /// Body, possibly base64-encoded.
    #[serde(default)]
    pub body: Option<String>,
    /// Whether `body` is base64-encoded.
    #[serde(default)]
    pub is_base64_encoded: bool,
    /// Raw request context.
    #[serde(default)]
    pub request_context: Option<Value>,
}

/// The invocation context handed to the function.
///
/// Stored in the action's request extensions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LambdaContext {
    /// Invocation request id.
    pub aws_request_id: String,
    /// ARN the function was invoked with.
    pub invoked_function_arn: String,
    /// Function name.
    pub function_name: String,
    /// Invocation deadline in epoch milliseconds.
    pub deadline_ms: u64,
}

impl LambdaContext {
    /// A context carrying only a request id.
    pub fn new(aws_request_id: impl Into<String>) -> Self {
        Self {
            aws_request_id: aws_request_id.into(),
            ..Self::default()
        }
    }
}

/// An event reduced to HTTP parts.
#[derive(Debug)]
pub(crate) struct IncomingRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ApiGatewayEvent {
    /// True for HTTP API events.
    pub fn is_http_api(&self) -> bool {
        matches!(self, Self::Http(_))
    }

    pub(crate) fn into_incoming(self) -> Result<IncomingRequest, LambdaError> {
        match self {
            Self::Http(event) => event.into_incoming(),
            Self::Rest(event) => event.into_incoming(),
        }
    }
}

impl HttpApiEvent {
    fn into_incoming(self) -> Result<IncomingRequest, LambdaError> {
        let method = parse_method(&self.request_context.http.method)?;
        let uri = parse_uri(&self.raw_path, &self.raw_query_string)?;

        let mut headers = HeaderMap::new();
        for (name, value) in self.headers.unwrap_or_default() {
            append_header(&mut headers, &name, &value);
        }
        if let Some(cookies) = self.cookies.filter(|c| !c.is_empty()) {
            headers.remove(COOKIE);
            append_header(&mut headers, COOKIE.as_str(), &cookies.join("; "));
        }

        Ok(IncomingRequest {
            method,
            uri,
            headers,
            body: decode_body(self.body, self.is_base64_encoded)?,
        })
    }
}

impl RestApiEvent {
    fn into_incoming(self) -> Result<IncomingRequest, LambdaError> {
        let method = parse_method(&self.http_method)?;

        let pairs: Vec<(String, String)> = match (self.multi_value_query_string_parameters, self.query_string_parameters) {
            (Some(multi), _) => multi
                .into_iter()
                .flat_map(|(key, values)| values.into_iter().map(move |v| (key.clone(), v)))
                .collect(),
            (None, Some(single)) => single.into_iter().collect(),
            (None, None) => Vec::new(),
        };
        let query = serde_urlencoded::to_string(&pairs).map_err(|err| LambdaError::InvalidEvent(err.to_string()))?;
        let uri = parse_uri(&self.path, &query)?;

        let mut headers = HeaderMap::new();
        match (self.multi_value_headers, self.headers) {
            (Some(multi), _) => {
                for (name, values) in multi {
                    for value in values {
                        append_header(&mut headers, &name, &value);
                    }
                }
            }
            (None, Some(single)) => {
                for (name, value) in single {
                    append_header(&mut headers, &name, &value);
                }
            }
            (None, None) => {}
        }

        Ok(IncomingRequest {
            method,
            uri,
            headers,
            body: decode_body(self.body, self.is_base64_encoded)?,
        })
    }
}

fn parse_method(method: &str) -> Result<Method, LambdaError> {
    Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .map_err(|_| LambdaError::InvalidEvent(format!("invalid method '{method}'")))
}

fn parse_uri(path: &str, query: &str) -> Result<Uri, LambdaError> {
    let path = if path.is_empty() { "/" } else { path };
    let target = if query.is_empty() {
        path.to_string()
    } else {
        format!("{path}?{query}")
    };
    target
        .parse()
        .map_err(|_| LambdaError::InvalidEvent(format!("invalid path '{target}'")))
}

fn append_header(headers: &mut HeaderMap, name: &str, value: &str) {
    match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
        (Ok(name), Ok(value)) => {
            headers.append(name, value);
        }
        _ => tracing::debug!(header = name, "skipping invalid header"),
    }
}

fn decode_body(body: Option<String>, base64: bool) -> Result<Bytes, LambdaError> {
    match body {
        None => Ok(Bytes::new()),
        Some(body) if base64 => Ok(Bytes::from(STANDARD.decode(body)?)),
        Some(body) => Ok(Bytes::from(body)),
    }
}

/// An API Gateway proxy response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiGatewayResponse {
    /// HTTP status code.
    pub status_code: u16,
    /// Headers, repeated values comma-joined.
    pub headers: BTreeMap<String, String>,
    /// Headers with every value.
    pub multi_value_headers: BTreeMap<String, Vec<String>>,
    /// Body, base64-encoded when `is_base64_encoded`.
    pub body: String,
    /// Whether `body` is base64-encoded.
    pub is_base64_encoded: bool,
    /// `Set-Cookie` values for HTTP API responses.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cookies: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_http_api_event() {
        let event: ApiGatewayEvent = serde_json::from_value(json!({
            "version": "2.0",
            "rawPath": "/users/7",
            "rawQueryString": "tag=a&tag=b",
            "headers": { "content-type": "application/json" },
            "cookies": ["session=abc", "theme=dark"],
            "requestContext": { "http": { "method": "post", "sourceIp": "10.0.0.1" } },
            "body": "{\"a\":1}",
            "isBase64Encoded": false
        }))
        .unwrap();
        assert!(event.is_http_api());

        let incoming = event.into_incoming().unwrap();
        assert_eq!(incoming.method, Method::POST);
        assert_eq!(incoming.uri.path(), "/users/7");
        assert_eq!(incoming.uri.query(), Some("tag=a&tag=b"));
        assert_eq!(incoming.headers[COOKIE], "session=abc; theme=dark");
        assert_eq!(incoming.body, Bytes::from_static(br#"{"a":1}"#));
    }

    #[test]
    fn test_rest_api_event_prefers_multi_value() {
        let event: ApiGatewayEvent = serde_json::from_value(json!({
            "httpMethod": "GET",
            "path": "/search",
            "headers": { "accept": "text/html" },
            "multiValueHeaders": { "accept": ["application/json", "text/plain"] },
            "queryStringParameters": { "q": "last" },
            "multiValueQueryStringParameters": { "q": ["first", "last"] },
            "body": null,
            "isBase64Encoded": false
        }))
        .unwrap();
        assert!(!event.is_http_api());

        let incoming = event.into_incoming().unwrap();
        assert_eq!(incoming.method, Method::GET);
        assert_eq!(incoming.uri.query(), Some("q=first&q=last"));
        assert_eq!(incoming.headers.get_all("accept").iter().count(), 2);
        assert!(incoming.body.is_empty());
    }

    #[test]
    fn test_base64_body() {
        let event: ApiGatewayEvent = serde_json::from_value(json!({
            "httpMethod": "PUT",
            "path": "/blob",
            "body": "AAEC",
            "isBase64Encoded": true
        }))
        .unwrap();

        let incoming = event.into_incoming().unwrap();
        assert_eq!(incoming.body, Bytes::from_static(&[0, 1, 2]));
    }

    #[test]
    fn test_invalid_base64_body() {
        let event: ApiGatewayEvent = serde_json::from_value(json!({
            "httpMethod": "PUT",
            "path": "/blob",
            "body": "!!!",
            "isBase64Encoded": true
        }))
        .unwrap();

        assert!(matches!(event.into_incoming(), Err(LambdaError::Base64(_))));
    }

    #[test]
    fn test_unrecognized_event() {
        let result = serde_json::from_value::<ApiGatewayEvent>(json!({ "detail-type": "Scheduled Event" }));
        assert!(result.is_err());
    }

    #[test]
    fn test_response_serialization() {
        let response = ApiGatewayResponse {
            status_code: 201,
            body: "{}".to_string(),
            ..ApiGatewayResponse::default()
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["statusCode"], 201);
        assert_eq!(value["isBase64Encoded"], false);
        assert!(value.get("cookies").is_none());
    }
}
