//! Coercion of arbitrary failures into [`H3Error`].
//!
//! # Responsibilities
//! - Pass existing `H3Error`s through untouched
//! - Wrap plain strings as 500s
//! - Read HTTP hints (`statusCode`, `status`, `statusMessage`, `statusText`,
//!   `fatal`, `unhandled`, `data`, `stack`) from loosely typed JSON objects
//! - Read the same hints from an `H3Error` found in a boxed error's source chain
//!
//! # Design Decisions
//! - The original failure always stays reachable through `source()`
//! - Field lookups mirror JavaScript truthiness where the wire format is loose

use std::error::Error as StdError;
use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;

use super::sanitize::{sanitize_status_message, sanitize_status_value};
use super::{BoxError, H3Error, DEFAULT_STATUS_CODE};

/// Anything a handler may fail with.
#[derive(Debug)]
pub enum ErrorInput {
    Error(H3Error),
    Message(String),
    Value(Value),
    Boxed(BoxError),
}

impl From<H3Error> for ErrorInput {
    fn from(err: H3Error) -> Self {
        ErrorInput::Error(err)
    }
}

impl From<String> for ErrorInput {
    fn from(message: String) -> Self {
        ErrorInput::Message(message)
    }
}

impl From<&str> for ErrorInput {
    fn from(message: &str) -> Self {
        ErrorInput::Message(message.to_string())
    }
}

impl From<Value> for ErrorInput {
    fn from(value: Value) -> Self {
        ErrorInput::Value(value)
    }
}

impl From<BoxError> for ErrorInput {
    fn from(err: BoxError) -> Self {
        ErrorInput::Boxed(err)
    }
}

/// A thrown JSON value kept as an error cause.
#[derive(Debug, Clone, Error)]
#[error("{}", describe_value(.0))]
pub struct ThrownValue(pub Value);

fn describe_value(value: &Value) -> String {
    match value.get("message").and_then(Value::as_str) {
        Some(message) => message.to_string(),
        None => value.to_string(),
    }
}

/// Convert any failure into an [`H3Error`]. Idempotent.
pub fn normalize_error(input: impl Into<ErrorInput>) -> H3Error {
    match input.into() {
        ErrorInput::Error(err) => err,
        ErrorInput::Message(message) => H3Error::new(message),
        ErrorInput::Value(value) => from_value(value),
        ErrorInput::Boxed(err) => from_boxed(err),
    }
}

/// Whether a boxed failure already is an [`H3Error`].
pub fn is_h3_error(err: &BoxError) -> bool {
    err.is::<H3Error>()
}

fn from_boxed(err: BoxError) -> H3Error {
    let err = match err.downcast::<H3Error>() {
        Ok(h3) => return *h3,
        Err(other) => other,
    };
    let err = match err.downcast::<ThrownValue>() {
        Ok(thrown) => return from_value(thrown.0),
        Err(other) => other,
    };

    let mut normalized = H3Error::new(err.to_string());
    if let Some(related) = find_in_chain(err.source()) {
        normalized.set_raw_status_code(related.status_code());
        normalized.set_raw_status_message(related.status_message().map(str::to_string));
        normalized = normalized
            .with_fatal(related.is_fatal())
            .with_unhandled(related.is_unhandled());
        if let Some(data) = related.data() {
            normalized = normalized.with_data(data.clone());
        }
    }
    normalized.set_cause(Arc::from(err));
    normalized
}

fn find_in_chain<'a>(mut source: Option<&'a (dyn StdError + 'static)>) -> Option<&'a H3Error> {
    while let Some(err) = source {
        if let Some(h3) = err.downcast_ref::<H3Error>() {
            return Some(h3);
        }
        source = err.source();
    }
    None
}

fn from_value(value: Value) -> H3Error {
    let map = match value {
        Value::String(message) => return H3Error::new(message),
        Value::Object(map) => map,
        other => {
            let mut err = H3Error::new("");
            err.set_cause(Arc::new(ThrownValue(other)));
            return err;
        }
    };

    let cause_value = map.get("cause").filter(|v| !v.is_null()).cloned();
    let cause = cause_value.as_ref().and_then(Value::as_object);

    let message = text_field(&map, "message")
        .or_else(|| text_field(&map, "statusMessage"))
        .unwrap_or_default();
    let mut err = H3Error::new(message);

    let stack = map
        .get("stack")
        .and_then(Value::as_str)
        .or_else(|| cause.and_then(|c| c.get("stack")).and_then(Value::as_str));
    if let Some(stack) = stack {
        err.set_stack(Some(stack.to_string()));
    }

    if let Some(data) = map.get("data").filter(|v| truthy(v)) {
        err = err.with_data(data.clone());
    }

    let status = first_truthy(&map, cause, &["statusCode", "status"]);
    if let Some(status) = status {
        err.set_raw_status_code(sanitize_status_value(status, DEFAULT_STATUS_CODE));
    }

    let status_message = first_truthy(&map, cause, &["statusMessage", "statusText"]);
    if let Some(status_message) = status_message {
        let raw = match status_message {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        err.set_raw_status_message(Some(clean_status_message(&raw)));
    }

    if let Some(fatal) = first_present(&map, cause, "fatal") {
        err = err.with_fatal(truthy(fatal));
    }
    if let Some(unhandled) = first_present(&map, cause, "unhandled") {
        err = err.with_unhandled(truthy(unhandled));
    }

    let cause = cause_value.unwrap_or(Value::Object(map));
    err.set_cause(Arc::new(ThrownValue(cause)));
    err
}

/// Sanitize a status message, warning when characters had to be dropped.
pub(crate) fn clean_status_message(raw: &str) -> String {
    let sanitized = sanitize_status_message(raw);
    if sanitized != raw {
        tracing::warn!(
            original = %raw.escape_debug(),
            sanitized = %sanitized,
            "Status message contained invalid characters and was sanitized"
        );
    }
    sanitized
}

fn text_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key).filter(|v| !v.is_null()).map(|v| match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

fn first_truthy<'a>(
    map: &'a Map<String, Value>,
    cause: Option<&'a Map<String, Value>>,
    keys: &[&str],
) -> Option<&'a Value> {
    let own = keys.iter().filter_map(|k| map.get(*k));
    let inherited = keys
        .iter()
        .filter_map(move |k| cause.and_then(|c| c.get(*k)));
    own.chain(inherited).find(|v| truthy(v))
}

fn first_present<'a>(
    map: &'a Map<String, Value>,
    cause: Option<&'a Map<String, Value>>,
    key: &str,
) -> Option<&'a Value> {
    map.get(key)
        .filter(|v| !v.is_null())
        .or_else(|| cause.and_then(|c| c.get(key)).filter(|v| !v.is_null()))
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
