//! Response shaping shared by all drivers.

use http::header::HeaderValue;
use http::{header, StatusCode};
use serde_json::{Map, Value};
use trellis_core::{Action, ActionError, ActionMetadata, Reply, ResponseBody, ResponseKind};

use crate::options::DriverOptions;
use crate::transform::ResultTransformer;

const JSON: &str = "application/json";
const HTML: &str = "text/html; charset=utf-8";
const OCTET_STREAM: &str = "application/octet-stream";

/// Writes a successful `reply` into the action's response.
///
/// The reply is transformed first. The status then follows the result:
///
/// | Reply | Status | Body |
/// |---|---|---|
/// | `Undefined`, undefined code set | that code | `{}` |
/// | `Undefined` | success code, else 200 | empty |
/// | `Null` | null code, else 204 | `null` for JSON actions, empty on 204 |
/// | anything else | success code, else 200 | the value |
pub fn write_success(options: &DriverOptions, action: &mut Action, reply: Reply, metadata: &ActionMetadata) {
    let reply = ResultTransformer::new(options).transform_result(reply, metadata);
    let response = &mut action.response;
    response.merge_headers(&metadata.headers);

    let success = metadata.success_http_code.unwrap_or(StatusCode::OK);
    match reply {
        Reply::Undefined => {
            match metadata
                .undefined_result_code
                .or(options.defaults.undefined_result_code)
            {
                Some(code) => {
                    response.status = code;
                    response.body = ResponseBody::Json(Value::Object(Map::new()));
                    response.default_content_type(JSON);
                }
                None => {
                    response.status = success;
                    response.body = ResponseBody::Empty;
                }
            }
        }
        Reply::Null => {
            response.status = metadata
                .null_result_code
                .or(options.defaults.null_result_code)
                .unwrap_or(StatusCode::NO_CONTENT);
            if response.status != StatusCode::NO_CONTENT && metadata.response_kind == ResponseKind::Json {
                response.default_content_type(JSON);
                response.body = ResponseBody::Json(Value::Null);
            } else {
                response.body = ResponseBody::Null;
            }
        }
        Reply::Json(value) => {
            response.status = success;
            match (metadata.response_kind, value) {
                (ResponseKind::Text, Value::String(text)) => {
                    response.default_content_type(HTML);
                    response.body = ResponseBody::Text(text);
                }
                (_, value) => {
                    response.default_content_type(JSON);
                    response.body = ResponseBody::Json(value);
                }
            }
        }
        Reply::Bytes(bytes) => {
            response.status = success;
            response.default_content_type(OCTET_STREAM);
            response.body = ResponseBody::Bytes(bytes);
        }
        Reply::Stream(stream) => {
            response.status = success;
            response.default_content_type(OCTET_STREAM);
            response.body = ResponseBody::Stream(stream);
        }
    }
}

/// Writes `error` into the action's response.
///
/// The application error handler runs at most once per request; after that,
/// or when none is installed, the global error handler produces the body.
pub fn write_error(options: &DriverOptions, action: &mut Action, error: &ActionError, metadata: Option<&ActionMetadata>) {
    let status = error.status();
    if status.is_server_error() {
        tracing::error!(status = status.as_u16(), error = %error.stack(), "action failed");
    } else {
        tracing::debug!(status = status.as_u16(), error = %error, "action rejected");
    }

    action.response.status = status;
    if let Some(metadata) = metadata {
        action.response.merge_headers(&metadata.headers);
    }

    if let Some(handler) = options.error_handler.as_ref().filter(|_| !action.error_handled) {
        let payload = handler.on_error(error, action, metadata);
        action.error_handled = true;
        set_json_body(action, payload);
        return;
    }

    let text = metadata.is_some_and(|m| m.response_kind == ResponseKind::Text);
    if text {
        let body = options.global_errors().handle_text(error);
        action.response.default_content_type(HTML);
        action.response.body = ResponseBody::Text(body);
    } else {
        let payload = options.global_errors().handle(error);
        set_json_body(action, payload);
    }
}

fn set_json_body(action: &mut Action, payload: Option<Value>) {
    match payload {
        Some(value) => {
            action.response.default_content_type(JSON);
            action.response.body = ResponseBody::Json(value);
        }
        None => action.response.body = ResponseBody::Empty,
    }
}

/// Sets the `Allow` header listing `methods`.
pub fn set_allow(action: &mut Action, methods: &[http::Method]) {
    let allow = methods.iter().map(http::Method::as_str).collect::<Vec<_>>().join(", ");
    if let Ok(value) = HeaderValue::from_str(&allow) {
        action.response.headers.insert(header::ALLOW, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;
    use serde_json::json;
    use trellis_core::{ActionHandler, ActionRequest, Container, HttpError, TransformOptions};

    struct Noop;

    fn metadata() -> ActionMetadata {
        ActionMetadata {
            id: "Noop.run".to_string(),
            controller: "Noop".to_string(),
            method: "run".to_string(),
            verb: Some(Method::GET),
            route: "/".to_string(),
            params: Vec::new(),
            headers: http::HeaderMap::new(),
            success_http_code: None,
            null_result_code: None,
            undefined_result_code: None,
            is_authorized_used: false,
            authorized_roles: Vec::new(),
            transform_response: None,
            transform_options: None,
            response_kind: ResponseKind::Json,
            interceptors: Vec::new(),
            middlewares: Vec::new(),
            handler: ActionHandler::new(|_: std::sync::Arc<Noop>| async { Ok::<_, ActionError>(()) }),
        }
    }

    fn action() -> Action {
        Action::new(ActionRequest::new(Method::GET, "/".parse().unwrap()))
    }

    fn options() -> std::sync::Arc<DriverOptions> {
        DriverOptions::builder(Container::new().freeze()).build()
    }

    #[test]
    fn test_undefined_with_code_sends_empty_object() {
        let mut meta = metadata();
        meta.undefined_result_code = Some(StatusCode::ACCEPTED);
        let mut action = action();

        write_success(&options(), &mut action, Reply::Undefined, &meta);

        assert_eq!(action.response.status, StatusCode::ACCEPTED);
        assert_eq!(action.response.body.as_json(), Some(&json!({})));
    }

    #[test]
    fn test_undefined_without_code_is_empty_200() {
        let mut action = action();
        write_success(&options(), &mut action, Reply::Undefined, &metadata());
        assert_eq!(action.response.status, StatusCode::OK);
        assert!(action.response.body.is_empty());
    }

    #[test]
    fn test_null_defaults_to_204() {
        let mut action = action();
        write_success(&options(), &mut action, Reply::Null, &metadata());
        assert_eq!(action.response.status, StatusCode::NO_CONTENT);
        assert!(matches!(action.response.body, ResponseBody::Null));
    }

    #[test]
    fn test_global_null_code() {
        let options = DriverOptions::builder(Container::new().freeze())
            .defaults(crate::ResultDefaults {
                null_result_code: Some(StatusCode::NOT_FOUND),
                ..Default::default()
            })
            .build();
        let mut action = action();
        write_success(&options, &mut action, Reply::Null, &metadata());
        assert_eq!(action.response.status, StatusCode::NOT_FOUND);
        assert!(matches!(action.response.body, ResponseBody::Json(Value::Null)));
        assert_eq!(action.response.headers[header::CONTENT_TYPE], JSON);

        let mut text = metadata();
        text.response_kind = ResponseKind::Text;
        let mut action = self::action();
        write_success(&options, &mut action, Reply::Null, &text);
        assert!(matches!(action.response.body, ResponseBody::Null));
    }

    #[test]
    fn test_success_code_and_headers() {
        let mut meta = metadata();
        meta.success_http_code = Some(StatusCode::CREATED);
        meta.headers
            .insert("x-kind", HeaderValue::from_static("user"));
        let mut action = action();

        write_success(&options(), &mut action, Reply::Json(json!({ "id": 1 })), &meta);

        assert_eq!(action.response.status, StatusCode::CREATED);
        assert_eq!(action.response.headers["x-kind"], "user");
        assert_eq!(action.response.headers[header::CONTENT_TYPE], JSON);
    }

    #[test]
    fn test_text_kind_renders_html() {
        let mut meta = metadata();
        meta.response_kind = ResponseKind::Text;
        let mut action = action();

        write_success(&options(), &mut action, Reply::Json(json!("<p>hi</p>")), &meta);

        assert!(matches!(&action.response.body, ResponseBody::Text(t) if t == "<p>hi</p>"));
        assert_eq!(action.response.headers[header::CONTENT_TYPE], HTML);
    }

    #[test]
    fn test_transform_applied_before_shaping() {
        let options = DriverOptions::builder(Container::new().freeze())
            .transform_options(TransformOptions {
                exclude_keys: vec!["secret".to_string()],
                ..Default::default()
            })
            .build();
        let mut action = action();

        write_success(&options, &mut action, Reply::Json(json!({ "a": 1, "secret": 2 })), &metadata());

        assert_eq!(action.response.body.as_json(), Some(&json!({ "a": 1 })));
    }

    #[test]
    fn test_error_uses_global_handler() {
        let mut action = action();
        let error = ActionError::from(HttpError::not_found("User doesn't exist"));

        write_error(&options(), &mut action, &error, Some(&metadata()));

        assert_eq!(action.response.status, StatusCode::NOT_FOUND);
        assert_eq!(
            action.response.body.as_json(),
            Some(&json!({ "name": "NotFoundError", "message": "User doesn't exist" }))
        );
    }

    #[test]
    fn test_custom_error_handler_runs_once() {
        let options = DriverOptions::builder(Container::new().freeze())
            .error_handler(|error: &ActionError, _: &Action, _: Option<&ActionMetadata>| {
                Some(json!({ "custom": error.to_string() }))
            })
            .build();
        let mut action = action();
        let error = ActionError::from(HttpError::bad_request("bad"));

        write_error(&options, &mut action, &error, None);
        assert!(action.error_handled);
        assert_eq!(action.response.body.as_json(), Some(&json!({ "custom": "bad" })));

        write_error(&options, &mut action, &error, None);
        assert_eq!(action.response.body.as_json().unwrap()["name"], json!("BadRequestError"));
    }

    #[test]
    fn test_allow_header() {
        let mut action = action();
        set_allow(&mut action, &[Method::GET, Method::POST]);
        assert_eq!(action.response.headers[header::ALLOW], "GET, POST");
    }
}
