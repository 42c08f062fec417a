//! Default error payloads.
//!
//! [`GlobalErrorHandler`] turns an [`ActionError`] into the body sent to the
//! client when no application error handler took over. It is a pure function
//! of the error, the development flag and the overriding map.

use std::collections::HashMap;

use serde_json::{Map, Value};
use trellis_core::ActionError;

const RESERVED_FIELDS: [&str; 4] = ["name", "message", "stack", "httpCode"];

/// Builds error payloads.
#[derive(Debug, Clone, Default)]
pub struct GlobalErrorHandler {
    development: bool,
    overrides: HashMap<String, Map<String, Value>>,
}

impl GlobalErrorHandler {
    /// Creates a handler; stacks are included in development mode.
    pub fn new(development: bool) -> Self {
        Self {
            development,
            overrides: HashMap::new(),
        }
    }

    /// Installs payload overrides keyed by error name.
    #[must_use]
    pub fn with_overrides(mut self, overrides: HashMap<String, Map<String, Value>>) -> Self {
        self.overrides = overrides;
        self
    }

    /// Overrides for errors named `name`.
    pub fn overrides(&self, name: &str) -> Option<&Map<String, Value>> {
        self.overrides.get(name)
    }

    /// The JSON payload for `error`, or `None` when there is nothing to send.
    ///
    /// Errors carrying their own serialization are returned as they
    /// serialize, and bare thrown values unchanged.
    pub fn handle(&self, error: &ActionError) -> Option<Value> {
        match error {
            ActionError::Custom(body) => Some(body.to_json()),
            ActionError::Thrown(value) => Some(value.clone()),
            _ => self.structured(error),
        }
    }

    /// The text payload for `error`.
    pub fn handle_text(&self, error: &ActionError) -> String {
        if self.development {
            error.stack()
        } else {
            error.to_string()
        }
    }

    fn structured(&self, error: &ActionError) -> Option<Value> {
        let mut payload = Map::new();
        let name = error.name();
        if !name.is_empty() {
            payload.insert("name".to_string(), Value::String(name.to_string()));
        }

        let message = error.to_string();
        if !message.is_empty() {
            payload.insert("message".to_string(), Value::String(message));
        }

        if self.development {
            payload.insert("stack".to_string(), Value::String(error.stack()));
        }

        for (key, value) in error.fields() {
            if !RESERVED_FIELDS.contains(&key.as_str()) {
                payload.insert(key, value);
            }
        }

        if let Some(overrides) = self.overrides.get(name) {
            for (key, value) in overrides {
                payload.insert(key.clone(), value.clone());
            }
        }

        (!payload.is_empty()).then_some(Value::Object(payload))
    }
}
