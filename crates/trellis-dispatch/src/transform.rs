//! Result transformation.
//!
//! A JSON object or array returned by a handler is projected through the
//! active [`TransformOptions`] before serialization: excluded keys are
//! dropped at every depth and, unless unset fields are exposed, `null`
//! members are removed. Scalars, binary data and streams pass through.

use serde_json::{Map, Value};
use trellis_core::{ActionMetadata, Reply, TransformOptions};

use crate::options::DriverOptions;

/// Applies result transformation for one driver.
#[derive(Debug, Clone, Copy)]
pub struct ResultTransformer<'a> {
    options: &'a DriverOptions,
}

impl<'a> ResultTransformer<'a> {
    /// Creates a transformer reading `options`.
    pub fn new(options: &'a DriverOptions) -> Self {
        Self { options }
    }

    /// Whether `reply` from the action described by `metadata` is transformed.
    pub fn applies(&self, reply: &Reply, metadata: &ActionMetadata) -> bool {
        self.options.class_transformer
            && metadata.transform_response != Some(false)
            && reply.is_object()
            && !(self.options.passthrough)(reply)
    }

    /// Transforms `reply` when transformation applies, otherwise returns it as is.
    pub fn transform_result(&self, reply: Reply, metadata: &ActionMetadata) -> Reply {
        if !self.applies(&reply, metadata) {
            return reply;
        }
        let options = metadata
            .transform_options
            .as_ref()
            .unwrap_or(&self.options.transform_options);
        match reply {
            Reply::Json(value) => Reply::Json(project(value, options)),
            other => other,
        }
    }
}

/// Projects `value` through `options`.
pub fn project(value: Value, options: &TransformOptions) -> Value {
    match value {
        Value::Object(map) => Value::Object(project_object(map, options)),
        Value::Array(items) => Value::Array(items.into_iter().map(|item| project(item, options)).collect()),
        scalar => scalar,
    }
}

fn project_object(map: Map<String, Value>, options: &TransformOptions) -> Map<String, Value> {
    map.into_iter()
        .filter(|(key, value)| {
            !options.exclude_keys.iter().any(|k| k == key)
                && !options.exclude_prefixes.iter().any(|p| key.starts_with(p.as_str()))
                && (options.expose_unset_fields || !value.is_null())
        })
        .map(|(key, value)| (key, project(value, options)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn exclusions() -> TransformOptions {
        TransformOptions {
            exclude_prefixes: vec!["_".to_string()],
            exclude_keys: vec!["password".to_string()],
            expose_unset_fields: false,
        }
    }

    #[test]
    fn test_project_nested() {
        let value = json!({
            "id": 1,
            "_rev": "3",
            "password": "hunter2",
            "profile": { "bio": null, "_internal": true, "name": "Ada" },
            "tags": [{ "password": "x", "label": "a" }],
        });

        assert_eq!(
            project(value, &exclusions()),
            json!({ "id": 1, "profile": { "name": "Ada" }, "tags": [{ "label": "a" }] })
        );
    }

    #[test]
    fn test_default_options_keep_nulls() {
        let value = json!({ "a": null, "b": [1, null] });
        assert_eq!(project(value.clone(), &TransformOptions::default()), value);
    }

    fn arb_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::from),
            "[a-z]{0,8}".prop_map(Value::String),
        ];
        leaf.prop_recursive(3, 32, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_default_projection_is_identity(value in arb_json()) {
            prop_assert_eq!(project(value.clone(), &TransformOptions::default()), value);
        }

        #[test]
        fn prop_projection_is_idempotent(value in arb_json()) {
            let once = project(value, &exclusions());
            prop_assert_eq!(project(once.clone(), &exclusions()), once);
        }
    }
}
