//! What a handler may return.

use std::fmt;

use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;

use super::body::{Blob, BodyStream, PreparedResponse};
use crate::error::H3Error;

/// Kinds of values that can never become a response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unsendable {
    Symbol,
    Function,
}

impl fmt::Display for Unsendable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unsendable::Symbol => f.write_str("symbol"),
            Unsendable::Function => f.write_str("function"),
        }
    }
}

/// Handler return channel. Serialization dispatches on the variant.
pub enum ResponseValue {
    /// A lower layer already wrote the response.
    Handled,
    /// Status, headers and body already assembled.
    Response(PreparedResponse),
    Empty,
    /// No route matched; becomes a 404 naming method and path.
    NotFound,
    Text(String),
    Bytes(Bytes),
    Error(H3Error),
    Json(Value),
    BigInt(i128),
    Blob(Blob),
    Stream(BodyStream),
    Unsendable(Unsendable),
}

impl ResponseValue {
    pub fn text(text: impl Into<String>) -> Self {
        ResponseValue::Text(text.into())
    }

    /// Serialize `value` to JSON; a serialization failure becomes a 500.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(value) => ResponseValue::Json(value),
            Err(e) => ResponseValue::Error(
                H3Error::with_status(500, "Failed to serialize response").with_cause(e),
            ),
        }
    }

    pub fn bigint(value: i128) -> Self {
        ResponseValue::BigInt(value)
    }

    pub fn stream(stream: BodyStream) -> Self {
        ResponseValue::Stream(stream)
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, ResponseValue::Empty)
    }

    /// Variant name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ResponseValue::Handled => "handled",
            ResponseValue::Response(_) => "response",
            ResponseValue::Empty => "empty",
            ResponseValue::NotFound => "not_found",
            ResponseValue::Text(_) => "text",
            ResponseValue::Bytes(_) => "bytes",
            ResponseValue::Error(_) => "error",
            ResponseValue::Json(_) => "json",
            ResponseValue::BigInt(_) => "bigint",
            ResponseValue::Blob(_) => "blob",
            ResponseValue::Stream(_) => "stream",
            ResponseValue::Unsendable(_) => "unsendable",
        }
    }
}

impl fmt::Debug for ResponseValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseValue::Response(response) => f.debug_tuple("Response").field(response).finish(),
            ResponseValue::Text(text) => f.debug_tuple("Text").field(text).finish(),
            ResponseValue::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            ResponseValue::Error(err) => f.debug_tuple("Error").field(err).finish(),
            ResponseValue::Json(value) => f.debug_tuple("Json").field(value).finish(),
            ResponseValue::BigInt(n) => f.debug_tuple("BigInt").field(n).finish(),
            ResponseValue::Blob(blob) => f.debug_tuple("Blob").field(blob).finish(),
            ResponseValue::Unsendable(kind) => f.debug_tuple("Unsendable").field(kind).finish(),
            other => f.write_str(other.kind()),
        }
    }
}

impl From<()> for ResponseValue {
    fn from(_: ()) -> Self {
        ResponseValue::Empty
    }
}

impl From<String> for ResponseValue {
    fn from(text: String) -> Self {
        ResponseValue::Text(text)
    }
}

impl From<&str> for ResponseValue {
    fn from(text: &str) -> Self {
        ResponseValue::Text(text.to_string())
    }
}

impl From<Bytes> for ResponseValue {
    fn from(bytes: Bytes) -> Self {
        ResponseValue::Bytes(bytes)
    }
}

impl From<Vec<u8>> for ResponseValue {
    fn from(bytes: Vec<u8>) -> Self {
        ResponseValue::Bytes(Bytes::from(bytes))
    }
}

impl From<Value> for ResponseValue {
    fn from(value: Value) -> Self {
        ResponseValue::Json(value)
    }
}

impl From<H3Error> for ResponseValue {
    fn from(err: H3Error) -> Self {
        ResponseValue::Error(err)
    }
}

impl From<Blob> for ResponseValue {
    fn from(blob: Blob) -> Self {
        ResponseValue::Blob(blob)
    }
}

impl From<PreparedResponse> for ResponseValue {
    fn from(response: PreparedResponse) -> Self {
        ResponseValue::Response(response)
    }
}

impl<T: Into<ResponseValue>> From<Option<T>> for ResponseValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(ResponseValue::Empty)
    }
}
