//! Parameter resolution.
//!
//! Resolving one declared parameter runs four steps in order:
//!
//! 1. extraction, through the driver (or the current-user checker)
//! 2. the required check
//! 3. normalization to the declared [`ParamType`]
//! 4. the parameter's validator, if any
//!
//! Normalization and validation only see values that are present.

use std::borrow::Cow;

use serde_json::{Number, Value};
use trellis_core::{Action, ActionError, ParamKind, ParamMetadata, ParamType, ParamValue};

use crate::driver::Driver;

/// Reads the raw value of `param` from the request.
///
/// This is the default extraction shared by all drivers. Current-user
/// parameters are never extracted here.
pub fn extract(action: &Action, param: &ParamMetadata) -> ParamValue {
    let request = &action.request;
    let name = param.name.as_deref().unwrap_or_default();
    match param.kind {
        ParamKind::Param => request.params.get(name).map(|v| Value::String(v.to_string())).into(),
        ParamKind::Query => request.query_value(name).into(),
        ParamKind::Queries => ParamValue::Value(request.query_object()),
        ParamKind::Body => request.body.to_value().into(),
        ParamKind::BodyParam => request.body.field(name).into(),
        ParamKind::Header => request.header(name).map(|v| Value::String(v.to_string())).into(),
        ParamKind::Headers => ParamValue::Value(request.headers_object()),
        ParamKind::Cookie => request
            .cookies()
            .get(name)
            .map(|v| Value::String(v.to_string()))
            .into(),
        ParamKind::Cookies => ParamValue::Value(request.cookies().to_value()),
        ParamKind::Session => request.session.clone().map(Value::Object).into(),
        ParamKind::SessionParam => request.session.as_ref().and_then(|s| s.get(name).cloned()).into(),
        ParamKind::File => request
            .files
            .iter()
            .find(|f| f.field_name == name)
            .cloned()
            .map_or(ParamValue::Undefined, ParamValue::File),
        ParamKind::Files => {
            let files: Vec<_> = request.files.iter().filter(|f| f.field_name == name).cloned().collect();
            if files.is_empty() {
                ParamValue::Undefined
            } else {
                ParamValue::Files(files)
            }
        }
        ParamKind::CurrentUser => ParamValue::Undefined,
    }
}

/// Resolves one declared parameter into the value handed to the handler.
pub async fn resolve(driver: &dyn Driver, action: &Action, param: &ParamMetadata) -> Result<ParamValue, ActionError> {
    let options = driver.options();
    let value = if param.kind == ParamKind::CurrentUser {
        let checker = options
            .current_user_checker
            .as_ref()
            .ok_or(ActionError::CurrentUserCheckerNotDefined)?;
        ParamValue::from(checker.current_user(action).await?)
    } else {
        driver.get_param_from_request(action, param).await?
    };

    if param.is_required(options.defaults.params_required) {
        check_required(action, param, &value)?;
    }

    if matches!(value, ParamValue::Undefined | ParamValue::Value(Value::Null)) {
        return Ok(value);
    }

    let value = normalize(param, value)?;
    if !value.is_missing() {
        validate(param, &value)?;
    }
    Ok(value)
}

fn check_required(action: &Action, param: &ParamMetadata, value: &ParamValue) -> Result<(), ActionError> {
    let missing = match param.kind {
        ParamKind::Body if param.name.is_none() => value.is_missing() || is_empty_object(value),
        ParamKind::CurrentUser => value.is_missing(),
        _ => param.name.is_some() && value.is_missing(),
    };
    if !missing {
        return Ok(());
    }

    let method = action.request.method.clone();
    let url = action.request.url();
    if param.kind == ParamKind::CurrentUser {
        return Err(ActionError::AuthorizationRequired { method, url });
    }
    Err(ActionError::ParamRequired {
        kind: param.kind,
        name: param.name.clone(),
        method,
        url,
    })
}

fn is_empty_object(value: &ParamValue) -> bool {
    matches!(value, ParamValue::Value(Value::Object(map)) if map.is_empty())
}

/// Converts string input to the declared type of `param`.
///
/// Repeated query values are normalized element by element. Non-string
/// values are left as they are.
pub fn normalize(param: &ParamMetadata, value: ParamValue) -> Result<ParamValue, ActionError> {
    if matches!(param.value_type, ParamType::Any | ParamType::String) {
        return Ok(value);
    }
    match value {
        ParamValue::Value(Value::String(raw)) => normalize_str(param, raw).map(ParamValue::Value),
        ParamValue::Value(Value::Array(items)) if param.value_type != ParamType::Json => items
            .into_iter()
            .map(|item| match item {
                Value::String(raw) => normalize_str(param, raw),
                other => Ok(other),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(|items| ParamValue::Value(Value::Array(items))),
        other => Ok(other),
    }
}

fn normalize_str(param: &ParamMetadata, raw: String) -> Result<Value, ActionError> {
    // A bare `flag=` means true for booleans and absent for the other types.
    if raw.is_empty() && param.value_type != ParamType::Boolean {
        return Ok(Value::Null);
    }

    let invalid = |raw: String| ActionError::InvalidParam {
        name: param.label().to_string(),
        value: raw,
        expected: Cow::Borrowed(param.value_type.as_str()),
    };

    match param.value_type {
        ParamType::Any | ParamType::String => Ok(Value::String(raw)),
        ParamType::Integer => raw.trim().parse::<i64>().map(Value::from).map_err(|_| invalid(raw)),
        ParamType::Number => {
            let trimmed = raw.trim();
            if let Ok(int) = trimmed.parse::<i64>() {
                return Ok(Value::from(int));
            }
            trimmed
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| invalid(raw))
        }
        ParamType::Boolean => match raw.as_str() {
            "true" | "1" | "" => Ok(Value::Bool(true)),
            "false" | "0" => Ok(Value::Bool(false)),
            _ => Err(invalid(raw)),
        },
        ParamType::Json => serde_json::from_str(&raw).map_err(|_| ActionError::ParameterParseJson {
            name: param.label().to_string(),
            value: raw,
        }),
    }
}

fn validate(param: &ParamMetadata, value: &ParamValue) -> Result<(), ActionError> {
    let (Some(validator), Some(value)) = (&param.validator, value.as_value()) else {
        return Ok(());
    };
    validator(value).map_err(|errors| ActionError::ParamValidation {
        name: param.label().to_string(),
        errors,
    })
}
