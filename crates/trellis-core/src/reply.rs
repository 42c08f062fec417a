//! Handler results.
//!
//! A handler returns anything implementing [`IntoReply`]. The result is kept
//! as a [`Reply`] until response shaping, so the pipeline can still tell an
//! absent result (`Undefined`) from an explicit `Null`, and a JSON document
//! from binary or streamed output.

use std::fmt;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::Stream;
use serde::Serialize;
use serde_json::Value;

use crate::error::ActionError;

/// A streamed response body.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send + Sync>>;

/// What a handler produced.
#[derive(Default)]
pub enum Reply {
    /// No result at all.
    #[default]
    Undefined,
    /// An explicit empty result.
    Null,
    /// A JSON value.
    Json(Value),
    /// Binary output, never transformed.
    Bytes(Bytes),
    /// Streamed output, never transformed.
    Stream(BodyStream),
}

impl Reply {
    /// Wraps a stream of byte chunks.
    pub fn stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, std::io::Error>> + Send + Sync + 'static,
    {
        Self::Stream(Box::pin(stream))
    }

    /// True for JSON objects and arrays.
    pub fn is_object(&self) -> bool {
        matches!(self, Self::Json(Value::Object(_) | Value::Array(_)))
    }

    /// True for byte buffers and streams.
    pub fn is_binary_or_stream(&self) -> bool {
        matches!(self, Self::Bytes(_) | Self::Stream(_))
    }

    /// The JSON value, if the reply is one.
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => f.write_str("Undefined"),
            Self::Null => f.write_str("Null"),
            Self::Json(value) => f.debug_tuple("Json").field(value).finish(),
            Self::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Serializes `T` into a JSON reply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Json<T>(pub T);

/// Conversion of handler output into a [`Reply`].
pub trait IntoReply {
    /// Performs the conversion.
    fn into_reply(self) -> Result<Reply, ActionError>;
}

impl IntoReply for Reply {
    fn into_reply(self) -> Result<Reply, ActionError> {
        Ok(self)
    }
}

impl IntoReply for () {
    fn into_reply(self) -> Result<Reply, ActionError> {
        Ok(Reply::Undefined)
    }
}

impl<T: IntoReply> IntoReply for Option<T> {
    fn into_reply(self) -> Result<Reply, ActionError> {
        match self {
            Some(inner) => inner.into_reply(),
            None => Ok(Reply::Null),
        }
    }
}

impl<T: Serialize> IntoReply for Json<T> {
    fn into_reply(self) -> Result<Reply, ActionError> {
        match serde_json::to_value(self.0)? {
            Value::Null => Ok(Reply::Null),
            value => Ok(Reply::Json(value)),
        }
    }
}

impl IntoReply for Value {
    fn into_reply(self) -> Result<Reply, ActionError> {
        Ok(match self {
            Value::Null => Reply::Null,
            value => Reply::Json(value),
        })
    }
}

impl IntoReply for String {
    fn into_reply(self) -> Result<Reply, ActionError> {
        Ok(Reply::Json(Value::String(self)))
    }
}

impl IntoReply for &'static str {
    fn into_reply(self) -> Result<Reply, ActionError> {
        Ok(Reply::Json(Value::String(self.to_string())))
    }
}

impl IntoReply for Bytes {
    fn into_reply(self) -> Result<Reply, ActionError> {
        Ok(Reply::Bytes(self))
    }
}

impl IntoReply for Vec<u8> {
    fn into_reply(self) -> Result<Reply, ActionError> {
        Ok(Reply::Bytes(Bytes::from(self)))
    }
}
