//! Static action descriptions.
//!
//! An [`ActionMetadata`] describes one controller action: its route, the
//! ordered parameter list, response codes, authorization policy, headers and
//! transform settings. Metadata is produced by the registry builder and is
//! immutable afterwards.

use std::fmt;
use std::sync::Arc;

use http::{HeaderMap, Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FieldError;
use crate::handler::ActionHandler;
use crate::interceptor::Interceptor;
use crate::middleware::Middleware;

/// Where a handler argument comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParamKind {
    /// One path parameter.
    Param,
    /// One query-string value.
    Query,
    /// The whole query string as an object.
    Queries,
    /// The whole request body.
    Body,
    /// One field of the request body.
    BodyParam,
    /// One request header.
    Header,
    /// All request headers as an object.
    Headers,
    /// One cookie.
    Cookie,
    /// All cookies as an object.
    Cookies,
    /// The whole session.
    Session,
    /// One session field.
    SessionParam,
    /// One uploaded file.
    File,
    /// All uploaded files under one field name.
    Files,
    /// The identity resolved by the current-user checker.
    CurrentUser,
}

impl ParamKind {
    /// Wire label of the kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Param => "param",
            Self::Query => "query",
            Self::Queries => "queries",
            Self::Body => "body",
            Self::BodyParam => "body-param",
            Self::Header => "header",
            Self::Headers => "headers",
            Self::Cookie => "cookie",
            Self::Cookies => "cookies",
            Self::Session => "session",
            Self::SessionParam => "session-param",
            Self::File => "file",
            Self::Files => "files",
            Self::CurrentUser => "current-user",
        }
    }

    /// True for kinds that look up one named value.
    pub const fn is_keyed(self) -> bool {
        matches!(
            self,
            Self::Param
                | Self::Query
                | Self::BodyParam
                | Self::Header
                | Self::Cookie
                | Self::SessionParam
                | Self::File
                | Self::Files
        )
    }

    /// Subject of a "... required for request on ..." message.
    pub fn required_description(self, name: Option<&str>) -> String {
        let name = name.unwrap_or_default();
        match self {
            Self::Param | Self::Query => format!("Parameter \"{name}\" is"),
            Self::Body => "Request body is".to_string(),
            Self::BodyParam => format!("Body parameter \"{name}\" is"),
            Self::Header => format!("Header \"{name}\" is"),
            Self::File => format!("Uploaded file \"{name}\" is"),
            Self::Files => format!("Uploaded files \"{name}\" are"),
            Self::Session | Self::SessionParam => "Session is".to_string(),
            Self::Cookie | Self::Cookies => "Cookie is".to_string(),
            Self::Queries | Self::Headers | Self::CurrentUser => "Parameter is".to_string(),
        }
    }
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared type of a parameter. String-sourced values are normalized to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    /// Leave the value as extracted.
    #[default]
    Any,
    /// Keep as a string.
    String,
    /// Parse as a floating point number.
    Number,
    /// Parse as an integer.
    Integer,
    /// Parse `true`/`false`/`1`/`0`.
    Boolean,
    /// Parse the string as JSON.
    Json,
}

impl ParamType {
    /// Label used in conversion errors.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Json => "JSON",
        }
    }
}

/// Validation hook run on a parameter after normalization.
pub type ParamValidator = Arc<dyn Fn(&Value) -> Result<(), Vec<FieldError>> + Send + Sync>;

/// One handler argument's extraction rule.
///
/// # Example
///
/// ```rust
/// use trellis_core::{ParamKind, ParamMetadata, ParamType};
///
/// let page = ParamMetadata::query("page").required(true).typed(ParamType::Integer);
/// assert_eq!(page.kind, ParamKind::Query);
/// assert!(page.is_required(false));
/// ```
#[derive(Clone)]
pub struct ParamMetadata {
    /// Source of the value.
    pub kind: ParamKind,
    /// Key for keyed kinds.
    pub name: Option<String>,
    /// Explicit required flag; `None` defers to the driver default.
    pub required: Option<bool>,
    /// Argument position, assigned in declaration order.
    pub index: usize,
    /// Declared type.
    pub value_type: ParamType,
    /// Optional validation hook.
    pub validator: Option<ParamValidator>,
}

impl ParamMetadata {
    /// Creates an unnamed parameter of `kind`.
    pub fn new(kind: ParamKind) -> Self {
        Self {
            kind,
            name: None,
            required: None,
            index: 0,
            value_type: ParamType::Any,
            validator: None,
        }
    }

    fn keyed(kind: ParamKind, name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::new(kind)
        }
    }

    /// A path parameter.
    pub fn param(name: impl Into<String>) -> Self {
        Self::keyed(ParamKind::Param, name)
    }

    /// A query-string value.
    pub fn query(name: impl Into<String>) -> Self {
        Self::keyed(ParamKind::Query, name)
    }

    /// The whole query string.
    pub fn queries() -> Self {
        Self::new(ParamKind::Queries)
    }

    /// The whole body.
    pub fn body() -> Self {
        Self::new(ParamKind::Body)
    }

    /// One body field.
    pub fn body_param(name: impl Into<String>) -> Self {
        Self::keyed(ParamKind::BodyParam, name)
    }

    /// One header (case-insensitive).
    pub fn header(name: impl Into<String>) -> Self {
        Self::keyed(ParamKind::Header, name)
    }

    /// All headers.
    pub fn headers() -> Self {
        Self::new(ParamKind::Headers)
    }

    /// One cookie.
    pub fn cookie(name: impl Into<String>) -> Self {
        Self::keyed(ParamKind::Cookie, name)
    }

    /// All cookies.
    pub fn cookies() -> Self {
        Self::new(ParamKind::Cookies)
    }

    /// The whole session.
    pub fn session() -> Self {
        Self::new(ParamKind::Session)
    }

    /// One session field.
    pub fn session_param(name: impl Into<String>) -> Self {
        Self::keyed(ParamKind::SessionParam, name)
    }

    /// One uploaded file.
    pub fn file(name: impl Into<String>) -> Self {
        Self::keyed(ParamKind::File, name)
    }

    /// All uploaded files under a field name.
    pub fn files(name: impl Into<String>) -> Self {
        Self::keyed(ParamKind::Files, name)
    }

    /// The current user.
    pub fn current_user() -> Self {
        Self::new(ParamKind::CurrentUser)
    }

    /// Sets the required flag.
    pub fn required(mut self, required: bool) -> Self {
        self.required = Some(required);
        self
    }

    /// Sets the declared type.
    pub fn typed(mut self, value_type: ParamType) -> Self {
        self.value_type = value_type;
        self
    }

    /// Attaches a validation hook.
    pub fn validate<F>(mut self, validator: F) -> Self
    where
        F: Fn(&Value) -> Result<(), Vec<FieldError>> + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Resolves the required flag against the driver default.
    pub fn is_required(&self, default: bool) -> bool {
        self.required.unwrap_or(default)
    }

    /// Name used in messages: the key, or the kind label.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(self.kind.as_str())
    }
}

impl fmt::Debug for ParamMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParamMetadata")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("required", &self.required)
            .field("index", &self.index)
            .field("value_type", &self.value_type)
            .field("validator", &self.validator.is_some())
            .finish()
    }
}

/// How successful results are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
    /// JSON controller: every result is written as JSON.
    #[default]
    Json,
    /// Text controller: strings are written as-is.
    Text,
}

/// Options for projecting results into plain JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransformOptions {
    /// Object keys starting with any of these prefixes are dropped.
    pub exclude_prefixes: Vec<String>,
    /// Object keys dropped by exact name.
    pub exclude_keys: Vec<String>,
    /// When false, `null` fields are dropped.
    pub expose_unset_fields: bool,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            exclude_prefixes: Vec::new(),
            exclude_keys: Vec::new(),
            expose_unset_fields: true,
        }
    }
}

/// Static description of one invokable action.
#[derive(Clone)]
pub struct ActionMetadata {
    /// Stable route key, `Controller.method`.
    pub id: String,
    /// Owning controller's short type name.
    pub controller: String,
    /// Handler method name.
    pub method: String,
    /// HTTP verb; `None` answers every verb.
    pub verb: Option<Method>,
    /// Full route pattern (controller prefix included).
    pub route: String,
    /// Parameters in declaration order.
    pub params: Vec<ParamMetadata>,
    /// Headers merged into every response.
    pub headers: HeaderMap,
    /// Status for successful results.
    pub success_http_code: Option<StatusCode>,
    /// Status for `null` results.
    pub null_result_code: Option<StatusCode>,
    /// Status for `undefined` results.
    pub undefined_result_code: Option<StatusCode>,
    /// Whether the authorization gate runs.
    pub is_authorized_used: bool,
    /// Roles handed to the authorization checker.
    pub authorized_roles: Vec<String>,
    /// Action-level transform switch.
    pub transform_response: Option<bool>,
    /// Action-level transform options.
    pub transform_options: Option<TransformOptions>,
    /// JSON or text rendering.
    pub response_kind: ResponseKind,
    /// Interceptors applied to the result, after the global ones.
    pub interceptors: Vec<Arc<dyn Interceptor>>,
    /// Middleware wrapped around this action only.
    pub middlewares: Vec<Arc<dyn Middleware>>,
    /// The bound handler.
    pub handler: ActionHandler,
}

impl ActionMetadata {
    /// True when any parameter resolves the current user.
    pub fn uses_current_user(&self) -> bool {
        self.params.iter().any(|p| p.kind == ParamKind::CurrentUser)
    }
}

impl fmt::Debug for ActionMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionMetadata")
            .field("id", &self.id)
            .field("verb", &self.verb)
            .field("route", &self.route)
            .field("params", &self.params)
            .field("success_http_code", &self.success_http_code)
            .field("null_result_code", &self.null_result_code)
            .field("undefined_result_code", &self.undefined_result_code)
            .field("is_authorized_used", &self.is_authorized_used)
            .field("authorized_roles", &self.authorized_roles)
            .field("response_kind", &self.response_kind)
            .finish_non_exhaustive()
    }
}
