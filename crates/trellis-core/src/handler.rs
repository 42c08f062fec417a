//! Handler binding.
//!
//! A controller action is an async function taking the controller instance
//! (`Arc<C>`, resolved from the container) followed by one argument per
//! declared parameter. Arguments are converted from resolved
//! [`ParamValue`]s through [`FromParam`], in declaration order.
//!
//! ```rust
//! use std::sync::Arc;
//! use trellis_core::{ActionError, Json};
//!
//! struct Users;
//!
//! impl Users {
//!     async fn find(self: Arc<Self>, id: i64, verbose: Option<bool>) -> Result<Json<i64>, ActionError> {
//!         let _ = verbose;
//!         Ok(Json(id))
//!     }
//! }
//! ```

use std::any::type_name;
use std::borrow::Cow;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::action::UploadedFile;
use crate::di::Container;
use crate::error::ActionError;
use crate::reply::{IntoReply, Json, Reply};
use crate::BoxFuture;

/// A parameter value after extraction and normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// Nothing was found.
    Undefined,
    /// A JSON value (strings, numbers, objects...).
    Value(Value),
    /// One uploaded file.
    File(UploadedFile),
    /// Several uploaded files.
    Files(Vec<UploadedFile>),
}

impl ParamValue {
    /// True for values a required parameter rejects: undefined, `null` and `""`.
    pub fn is_missing(&self) -> bool {
        match self {
            Self::Undefined | Self::Value(Value::Null) => true,
            Self::Value(Value::String(s)) => s.is_empty(),
            Self::Files(files) => files.is_empty(),
            _ => false,
        }
    }

    /// The JSON value, if this is one.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            _ => None,
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Undefined => "undefined".to_string(),
            Self::Value(Value::String(s)) => s.clone(),
            Self::Value(value) => value.to_string(),
            Self::File(file) => format!("file {}", file.field_name),
            Self::Files(files) => format!("{} files", files.len()),
        }
    }
}

impl From<Option<Value>> for ParamValue {
    fn from(value: Option<Value>) -> Self {
        value.map_or(Self::Undefined, Self::Value)
    }
}

/// One resolved argument and the label used in conversion errors.
#[derive(Debug, Clone)]
pub struct Arg {
    /// Parameter label.
    pub label: String,
    /// Resolved value.
    pub value: ParamValue,
}

/// Resolved arguments, consumed front to back by the handler.
#[derive(Debug, Default)]
pub struct Args {
    inner: std::collections::VecDeque<Arg>,
}

impl Args {
    /// Creates an empty argument list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an argument.
    pub fn push(&mut self, label: impl Into<String>, value: ParamValue) {
        self.inner.push_back(Arg {
            label: label.into(),
            value,
        });
    }

    /// Number of remaining arguments.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// True when every argument was consumed.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Converts the next argument. Missing arguments convert from `Undefined`.
    pub fn extract<T: FromParam>(&mut self) -> Result<T, ActionError> {
        let arg = self.inner.pop_front().unwrap_or(Arg {
            label: "argument".to_string(),
            value: ParamValue::Undefined,
        });
        T::from_param(arg.value, &arg.label)
    }
}

/// Conversion from a resolved parameter into a handler argument.
pub trait FromParam: Sized {
    /// Performs the conversion.
    fn from_param(value: ParamValue, label: &str) -> Result<Self, ActionError>;
}

fn invalid(label: &str, value: &ParamValue, expected: impl Into<Cow<'static, str>>) -> ActionError {
    ActionError::InvalidParam {
        name: label.to_string(),
        value: value.describe(),
        expected: expected.into(),
    }
}

impl FromParam for ParamValue {
    fn from_param(value: ParamValue, _label: &str) -> Result<Self, ActionError> {
        Ok(value)
    }
}

impl FromParam for Value {
    fn from_param(value: ParamValue, label: &str) -> Result<Self, ActionError> {
        match value {
            ParamValue::Undefined => Ok(Value::Null),
            ParamValue::Value(value) => Ok(value),
            other => Err(invalid(label, &other, "JSON")),
        }
    }
}

impl<T: FromParam> FromParam for Option<T> {
    fn from_param(value: ParamValue, label: &str) -> Result<Self, ActionError> {
        match value {
            ParamValue::Undefined | ParamValue::Value(Value::Null) => Ok(None),
            other => T::from_param(other, label).map(Some),
        }
    }
}

impl FromParam for String {
    fn from_param(value: ParamValue, label: &str) -> Result<Self, ActionError> {
        match value {
            ParamValue::Value(Value::String(s)) => Ok(s),
            ParamValue::Value(v @ (Value::Number(_) | Value::Bool(_))) => Ok(v.to_string()),
            other => Err(invalid(label, &other, "string")),
        }
    }
}

fn scalar<T>(value: ParamValue, label: &str, expected: &'static str) -> Result<T, ActionError>
where
    T: DeserializeOwned + FromStr,
{
    let parsed = match &value {
        ParamValue::Value(Value::String(s)) => s.trim().parse::<T>().ok(),
        ParamValue::Value(v @ (Value::Number(_) | Value::Bool(_))) => {
            serde_json::from_value::<T>(v.clone()).ok()
        }
        _ => None,
    };
    parsed.ok_or_else(|| invalid(label, &value, expected))
}

macro_rules! impl_from_param_scalar {
    ($($ty:ty => $expected:literal),* $(,)?) => {
        $(
            impl FromParam for $ty {
                fn from_param(value: ParamValue, label: &str) -> Result<Self, ActionError> {
                    scalar(value, label, $expected)
                }
            }
        )*
    };
}

impl_from_param_scalar! {
    i64 => "integer",
    i32 => "integer",
    u64 => "integer",
    u32 => "integer",
    usize => "integer",
    f64 => "number",
    f32 => "number",
    bool => "boolean",
}

impl<T: DeserializeOwned> FromParam for Json<T> {
    fn from_param(value: ParamValue, label: &str) -> Result<Self, ActionError> {
        let json = match &value {
            ParamValue::Undefined => Value::Null,
            ParamValue::Value(v) => v.clone(),
            other => return Err(invalid(label, other, "JSON")),
        };
        serde_json::from_value::<T>(json)
            .map(Json)
            .map_err(|_| invalid(label, &value, short_type_name::<T>()))
    }
}

impl FromParam for UploadedFile {
    fn from_param(value: ParamValue, label: &str) -> Result<Self, ActionError> {
        match value {
            ParamValue::File(file) => Ok(file),
            ParamValue::Files(mut files) if !files.is_empty() => Ok(files.remove(0)),
            other => Err(invalid(label, &other, "file")),
        }
    }
}

impl FromParam for Vec<UploadedFile> {
    fn from_param(value: ParamValue, label: &str) -> Result<Self, ActionError> {
        match value {
            ParamValue::Undefined => Ok(Vec::new()),
            ParamValue::File(file) => Ok(vec![file]),
            ParamValue::Files(files) => Ok(files),
            other => Err(invalid(label, &other, "files")),
        }
    }
}

/// Last path segment of a type name (`my_app::User` becomes `User`).
pub(crate) fn short_type_name<T: ?Sized>() -> String {
    let full = type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}

/// An async function callable as the action of controller `C`.
///
/// Implemented for functions `Fn(Arc<C>, T1, ..., Tn) -> impl Future<Output =
/// Result<R, E>>` with up to eight [`FromParam`] arguments, where `R:
/// IntoReply` and `E: Into<ActionError>`. Methods declared with
/// `self: Arc<Self>` qualify directly.
pub trait Handler<C, T>: Clone + Send + Sync + 'static {
    /// Converts the arguments and calls the function.
    fn call(&self, controller: Arc<C>, args: Args) -> BoxFuture<'static, Result<Reply, ActionError>>;
}

macro_rules! impl_handler {
    ($($ty:ident),*) => {
        #[allow(non_snake_case, unused_mut, unused_variables)]
        impl<C, F, Fut, R, E, $($ty,)*> Handler<C, ($($ty,)*)> for F
        where
            C: Send + Sync + 'static,
            F: Fn(Arc<C>, $($ty,)*) -> Fut + Clone + Send + Sync + 'static,
            Fut: Future<Output = Result<R, E>> + Send + 'static,
            R: IntoReply,
            E: Into<ActionError>,
            $($ty: FromParam,)*
        {
            fn call(&self, controller: Arc<C>, args: Args) -> BoxFuture<'static, Result<Reply, ActionError>> {
                let mut args = args;
                $(
                    let $ty = match args.extract::<$ty>() {
                        Ok(value) => value,
                        Err(err) => return Box::pin(async move { Err(err) }),
                    };
                )*
                let fut = (self)(controller, $($ty,)*);
                Box::pin(async move {
                    match fut.await {
                        Ok(output) => output.into_reply(),
                        Err(err) => Err(err.into()),
                    }
                })
            }
        }
    };
}

impl_handler!();
impl_handler!(T1);
impl_handler!(T1, T2);
impl_handler!(T1, T2, T3);
impl_handler!(T1, T2, T3, T4);
impl_handler!(T1, T2, T3, T4, T5);
impl_handler!(T1, T2, T3, T4, T5, T6);
impl_handler!(T1, T2, T3, T4, T5, T6, T7);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8);

type ErasedInvoke =
    dyn Fn(&Container, Args) -> BoxFuture<'static, Result<Reply, ActionError>> + Send + Sync;

/// A type-erased action: resolves the controller from the container, then
/// calls the bound function.
#[derive(Clone)]
pub struct ActionHandler {
    invoke: Arc<ErasedInvoke>,
}

impl ActionHandler {
    /// Binds `handler` to controller type `C`.
    pub fn new<C, T, H>(handler: H) -> Self
    where
        C: Send + Sync + 'static,
        H: Handler<C, T>,
    {
        Self {
            invoke: Arc::new(move |container: &Container, args: Args| -> BoxFuture<'static, Result<Reply, ActionError>> {
                match container.resolve_required::<C>() {
                    Ok(controller) => handler.call(controller, args),
                    Err(err) => Box::pin(async move { Err(ActionError::Injection(err)) }),
                }
            }),
        }
    }

    /// Resolves the controller and runs the handler.
    pub fn invoke(&self, container: &Container, args: Args) -> BoxFuture<'static, Result<Reply, ActionError>> {
        (self.invoke)(container, args)
    }
}

impl fmt::Debug for ActionHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ActionHandler")
    }
}
