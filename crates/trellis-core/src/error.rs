//! Error types for the dispatch pipeline.
//!
//! [`ActionError`] is the closed set of failures an action can end in. Every
//! variant knows its HTTP status, its public name and any extra fields the
//! error payload should carry, so response shaping never has to probe an
//! error's shape at runtime.
//!
//! | Variant | Status |
//! |---|---|
//! | `AuthorizationCheckerNotDefined` | 500 |
//! | `CurrentUserCheckerNotDefined` | 500 |
//! | `AuthorizationRequired` | 401 |
//! | `AccessDenied` | 403 |
//! | `ParamRequired` | 400 |
//! | `ParameterParseJson` | 400 |
//! | `InvalidParam` | 400 |
//! | `ParamValidation` | 400 |
//! | `Http` | declared code, else 500 |
//! | `Custom` | declared code, else 500 |
//! | `Thrown` | 500 |
//! | `Injection` | 500 |

use std::borrow::Cow;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use http::{Method, StatusCode};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::di::InjectionError;
use crate::metadata::ParamKind;

/// Result type alias using [`ActionError`].
pub type ActionResult<T> = Result<T, ActionError>;

/// Name used by errors that do not declare one of their own.
const GENERIC_NAME: &str = "Error";

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// Path of the offending field.
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

impl FieldError {
    /// Creates a field error.
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// An error that serializes itself.
///
/// When a handler fails with an error implementing this trait, the error
/// payload is exactly what [`ErrorBody::to_json`] returns.
///
/// # Example
///
/// ```rust
/// use std::fmt;
/// use http::StatusCode;
/// use serde_json::{json, Value};
/// use trellis_core::{ActionError, ErrorBody};
///
/// #[derive(Debug)]
/// struct QuotaExceeded { remaining: u32 }
///
/// impl fmt::Display for QuotaExceeded {
///     fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
///         write!(f, "quota exceeded")
///     }
/// }
///
/// impl ErrorBody for QuotaExceeded {
///     fn http_code(&self) -> Option<StatusCode> { Some(StatusCode::TOO_MANY_REQUESTS) }
///     fn to_json(&self) -> Value { json!({ "code": "QUOTA", "remaining": self.remaining }) }
/// }
///
/// let err = ActionError::custom(QuotaExceeded { remaining: 0 });
/// assert_eq!(err.status(), StatusCode::TOO_MANY_REQUESTS);
/// ```
pub trait ErrorBody: fmt::Debug + fmt::Display + Send + Sync + 'static {
    /// HTTP status this error maps to, if any.
    fn http_code(&self) -> Option<StatusCode> {
        None
    }

    /// The complete error payload.
    fn to_json(&self) -> Value;
}

/// A structured error thrown by a handler.
///
/// Carries an optional HTTP status, a public name, a message and any number
/// of extra fields that are copied into the error payload.
///
/// # Example
///
/// ```rust
/// use http::StatusCode;
/// use trellis_core::HttpError;
///
/// let err = HttpError::not_found("User doesn't exist").with_field("userId", 42);
/// assert_eq!(err.status(), StatusCode::NOT_FOUND);
/// assert_eq!(err.resolved_name(), "NotFoundError");
/// ```
#[derive(Debug, Clone)]
pub struct HttpError {
    http_code: Option<StatusCode>,
    name: String,
    message: String,
    fields: Map<String, Value>,
    source: Option<Arc<dyn StdError + Send + Sync>>,
}

impl HttpError {
    /// Creates an error with an explicit status and the generic name.
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            http_code: Some(status),
            name: GENERIC_NAME.to_string(),
            message: message.into(),
            fields: Map::new(),
            source: None,
        }
    }

    /// Creates an error with no declared status.
    pub fn plain(message: impl Into<String>) -> Self {
        Self {
            http_code: None,
            ..Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
        }
    }

    fn named(status: StatusCode, name: &str, message: impl Into<String>) -> Self {
        Self::new(status, message).with_name(name)
    }

    /// 400 `BadRequestError`.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::named(StatusCode::BAD_REQUEST, "BadRequestError", message)
    }

    /// 401 `UnauthorizedError`.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::named(StatusCode::UNAUTHORIZED, "UnauthorizedError", message)
    }

    /// 403 `ForbiddenError`.
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::named(StatusCode::FORBIDDEN, "ForbiddenError", message)
    }

    /// 404 `NotFoundError`.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::named(StatusCode::NOT_FOUND, "NotFoundError", message)
    }

    /// 405 `MethodNotAllowedError`.
    pub fn method_not_allowed(message: impl Into<String>) -> Self {
        Self::named(StatusCode::METHOD_NOT_ALLOWED, "MethodNotAllowedError", message)
    }

    /// 406 `NotAcceptableError`.
    pub fn not_acceptable(message: impl Into<String>) -> Self {
        Self::named(StatusCode::NOT_ACCEPTABLE, "NotAcceptableError", message)
    }

    /// 500 `InternalServerError`.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::named(StatusCode::INTERNAL_SERVER_ERROR, "InternalServerError", message)
    }

    /// Overrides the public name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Adds an extra payload field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Attaches the error that caused this one.
    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// The declared status, if any.
    pub fn http_code(&self) -> Option<StatusCode> {
        self.http_code
    }

    /// The declared status, or 500.
    pub fn status(&self) -> StatusCode {
        self.http_code.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// The declared name, which may be the generic `Error`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The public name: the declared name, or `HttpError` when the declared
    /// name is generic.
    pub fn resolved_name(&self) -> &str {
        if self.name.is_empty() || self.name == GENERIC_NAME {
            "HttpError"
        } else {
            &self.name
        }
    }

    /// The message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Extra payload fields.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl StdError for HttpError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|s| s as &(dyn StdError + 'static))
    }
}

/// Every way an action can fail.
#[derive(Error, Debug, Clone)]
pub enum ActionError {
    /// An authorized action was hit but no authorization checker is configured.
    #[error("Cannot use authorized actions. Please define authorization_checker before using them.")]
    AuthorizationCheckerNotDefined,

    /// A current-user parameter was declared but no current-user checker is configured.
    #[error("Cannot use current-user parameters. Please define current_user_checker before using them.")]
    CurrentUserCheckerNotDefined,

    /// The authorization checker rejected a request to an action without roles.
    #[error("Authorization is required for request on {method} {url}")]
    AuthorizationRequired {
        /// Request method.
        method: Method,
        /// Request URL.
        url: String,
    },

    /// The authorization checker rejected a request to an action with roles.
    #[error("Access is denied for request on {method} {url}")]
    AccessDenied {
        /// Request method.
        method: Method,
        /// Request URL.
        url: String,
    },

    /// A required parameter resolved to nothing.
    #[error("{} required for request on {method} {url}", .kind.required_description(.name.as_deref()))]
    ParamRequired {
        /// Kind of the missing parameter.
        kind: ParamKind,
        /// Name of the missing parameter, for keyed kinds.
        name: Option<String>,
        /// Request method.
        method: Method,
        /// Request URL.
        url: String,
    },

    /// A JSON-typed parameter was not valid JSON.
    #[error("Given parameter {name} is invalid. Value ({value}) cannot be parsed into JSON.")]
    ParameterParseJson {
        /// Parameter name.
        name: String,
        /// The raw value.
        value: String,
    },

    /// A parameter could not be converted to its declared type.
    #[error("Given parameter {name} is invalid. Value ({value}) cannot be parsed into {expected}.")]
    InvalidParam {
        /// Parameter name.
        name: String,
        /// The raw value.
        value: String,
        /// The declared type.
        expected: Cow<'static, str>,
    },

    /// A parameter validator reported field errors.
    #[error("Invalid parameter {name}")]
    ParamValidation {
        /// Parameter name.
        name: String,
        /// Field-level failures.
        errors: Vec<FieldError>,
    },

    /// A structured error thrown by a handler.
    #[error(transparent)]
    Http(#[from] HttpError),

    /// An error carrying its own serialization.
    #[error("{0}")]
    Custom(Arc<dyn ErrorBody>),

    /// A bare value thrown by a handler.
    #[error("{0}")]
    Thrown(Value),

    /// The action's controller could not be resolved from the container.
    #[error(transparent)]
    Injection(#[from] InjectionError),
}

impl ActionError {
    /// Wraps an error that serializes itself.
    pub fn custom(body: impl ErrorBody) -> Self {
        Self::Custom(Arc::new(body))
    }

    /// Wraps a bare thrown value.
    pub fn thrown(value: impl Into<Value>) -> Self {
        Self::Thrown(value.into())
    }

    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::AuthorizationRequired { .. } => StatusCode::UNAUTHORIZED,
            Self::AccessDenied { .. } => StatusCode::FORBIDDEN,
            Self::ParamRequired { .. }
            | Self::ParameterParseJson { .. }
            | Self::InvalidParam { .. }
            | Self::ParamValidation { .. } => StatusCode::BAD_REQUEST,
            Self::Http(err) => err.status(),
            Self::Custom(body) => body.http_code().unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            Self::AuthorizationCheckerNotDefined
            | Self::CurrentUserCheckerNotDefined
            | Self::Thrown(_)
            | Self::Injection(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Public error name used in payloads.
    pub fn name(&self) -> &str {
        match self {
            Self::AuthorizationCheckerNotDefined => "AuthorizationCheckerNotDefinedError",
            Self::CurrentUserCheckerNotDefined => "CurrentUserCheckerNotDefinedError",
            Self::AuthorizationRequired { .. } => "AuthorizationRequiredError",
            Self::AccessDenied { .. } => "AccessDeniedError",
            Self::ParamRequired { .. } => "ParamRequiredError",
            Self::ParameterParseJson { .. } => "ParameterParseJsonError",
            Self::InvalidParam { .. } => "InvalidParamError",
            Self::ParamValidation { .. } => "BadRequestError",
            Self::Http(err) => err.resolved_name(),
            Self::Custom(_) | Self::Thrown(_) => GENERIC_NAME,
            Self::Injection(_) => "InjectionError",
        }
    }

    /// Extra fields carried into the payload.
    pub fn fields(&self) -> Map<String, Value> {
        match self {
            Self::ParamValidation { errors, .. } => {
                let mut map = Map::new();
                map.insert(
                    "errors".to_string(),
                    serde_json::to_value(errors).unwrap_or(Value::Null),
                );
                map
            }
            Self::Http(err) => err.fields().clone(),
            _ => Map::new(),
        }
    }

    /// Human-readable trace: the name and message followed by each source.
    pub fn stack(&self) -> String {
        let mut stack = format!("{}: {}", self.name(), self);
        let mut source = StdError::source(self);
        while let Some(err) = source {
            stack.push_str("\n    caused by: ");
            stack.push_str(&err.to_string());
            source = err.source();
        }
        stack
    }

    /// True for bare thrown values, which are never reshaped.
    pub fn is_thrown(&self) -> bool {
        matches!(self, Self::Thrown(_))
    }
}

impl From<anyhow::Error> for ActionError {
    fn from(err: anyhow::Error) -> Self {
        let message = err.to_string();
        let boxed: Box<dyn StdError + Send + Sync> = err.into();
        Self::Http(HttpError {
            source: Some(Arc::from(boxed)),
            ..HttpError::internal(message)
        })
    }
}

impl From<serde_json::Error> for ActionError {
    fn from(err: serde_json::Error) -> Self {
        Self::Http(HttpError::internal(err.to_string()).with_source(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_required_messages() {
        let err = ActionError::ParamRequired {
            kind: ParamKind::Body,
            name: None,
            method: Method::POST,
            url: "/users".into(),
        };
        assert_eq!(err.to_string(), "Request body is required for request on POST /users");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err = ActionError::ParamRequired {
            kind: ParamKind::Files,
            name: Some("photos".into()),
            method: Method::PUT,
            url: "/albums/1".into(),
        };
        assert_eq!(
            err.to_string(),
            "Uploaded files \"photos\" are required for request on PUT /albums/1"
        );
    }

    #[test]
    fn test_authorization_messages() {
        let err = ActionError::AccessDenied {
            method: Method::DELETE,
            url: "/users/1".into(),
        };
        assert_eq!(err.to_string(), "Access is denied for request on DELETE /users/1");
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(err.name(), "AccessDeniedError");

        let err = ActionError::AuthorizationRequired {
            method: Method::GET,
            url: "/me".into(),
        };
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);

        assert_eq!(
            ActionError::AuthorizationCheckerNotDefined.to_string(),
            "Cannot use authorized actions. Please define authorization_checker before using them."
        );
    }

    #[test]
    fn test_http_error_names() {
        let generic = HttpError::new(StatusCode::CONFLICT, "taken");
        assert_eq!(generic.name(), "Error");
        assert_eq!(generic.resolved_name(), "HttpError");

        let plain = HttpError::plain("boom");
        assert_eq!(plain.http_code(), None);
        assert_eq!(ActionError::from(plain).status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_stack_includes_sources() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let err = ActionError::from(HttpError::internal("save failed").with_source(io));
        let stack = err.stack();
        assert!(stack.starts_with("InternalServerError: save failed"));
        assert!(stack.contains("caused by: disk full"));
    }

    #[test]
    fn test_validation_fields() {
        let err = ActionError::ParamValidation {
            name: "body".into(),
            errors: vec![FieldError::new("email", "must be an email")],
        };
        assert_eq!(
            err.fields()["errors"],
            serde_json::json!([{ "field": "email", "message": "must be an email" }])
        );
        assert_eq!(err.to_string(), "Invalid parameter body");
    }

    #[test]
    fn test_from_anyhow() {
        let err: ActionError = anyhow::anyhow!("db down").into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "db down");
    }
}
