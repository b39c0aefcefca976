//! Error model subsystem.
//!
//! # Data Flow
//! ```text
//! handler / hook failure (BoxError, String, JSON value, H3Error)
//!     → normalize.rs (coerce into H3Error, keep the cause reachable)
//!     → sanitize.rs (status code range, status message charset)
//!     → H3Error::response_body (JSON wire shape)
//!     → response serialization
//! ```
//!
//! # Design Decisions
//! - `H3Error` is recognized by downcasting, not by where it was constructed
//! - Normalization never fails and never panics
//! - Internal `message` text is never part of the client-facing body

pub mod normalize;
pub mod sanitize;

use std::backtrace::{Backtrace, BacktraceStatus};
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

pub use normalize::{is_h3_error, normalize_error, ErrorInput, ThrownValue};
pub use sanitize::{sanitize_status_code, sanitize_status_message, sanitize_status_value};

/// Error type produced by handlers and hooks.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Status code used when nothing better is known.
pub const DEFAULT_STATUS_CODE: u16 = 500;

/// An error carrying HTTP semantics.
#[derive(Debug, Clone)]
pub struct H3Error {
    message: String,
    status_code: u16,
    status_message: Option<String>,
    fatal: bool,
    unhandled: bool,
    data: Option<Value>,
    cause: Option<Arc<dyn StdError + Send + Sync>>,
    stack: Option<String>,
}

impl H3Error {
    /// Create a 500 error with an internal message.
    pub fn new(message: impl Into<String>) -> Self {
        let message = message.into();
        let stack = Some(capture_stack(&message));
        Self {
            message,
            status_code: DEFAULT_STATUS_CODE,
            status_message: None,
            fatal: false,
            unhandled: false,
            data: None,
            cause: None,
            stack,
        }
    }

    /// Create an error with a status code and client-visible status message.
    pub fn with_status(status_code: u16, status_message: impl Into<String>) -> Self {
        let status_message = status_message.into();
        Self::new(status_message.clone())
            .with_status_code(status_code)
            .with_status_message(status_message)
    }

    /// 404 for a request no route could handle.
    pub fn not_found(method: &str, path: &str) -> Self {
        Self::with_status(
            404,
            format!("Cannot find any route matching [{method}] {path}"),
        )
    }

    /// Set the status code; out-of-range values fall back to 500.
    pub fn with_status_code(mut self, code: u16) -> Self {
        self.status_code = sanitize_status_code(code, DEFAULT_STATUS_CODE);
        self
    }

    /// Set the client-visible status message.
    pub fn with_status_message(mut self, message: impl Into<String>) -> Self {
        self.status_message = Some(normalize::clean_status_message(&message.into()));
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_fatal(mut self, fatal: bool) -> Self {
        self.fatal = fatal;
        self
    }

    pub fn with_unhandled(mut self, unhandled: bool) -> Self {
        self.unhandled = unhandled;
        self
    }

    /// Chain the original failure.
    pub fn with_cause<E>(mut self, cause: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        self.cause = Some(Arc::new(cause));
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn status_message(&self) -> Option<&str> {
        self.status_message.as_deref()
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal
    }

    pub fn is_unhandled(&self) -> bool {
        self.unhandled
    }

    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    pub fn cause(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.cause.as_deref()
    }

    pub fn stack(&self) -> Option<&str> {
        self.stack.as_deref()
    }

    pub(crate) fn set_stack(&mut self, stack: Option<String>) {
        self.stack = stack;
    }

    pub(crate) fn set_cause(&mut self, cause: Arc<dyn StdError + Send + Sync>) {
        self.cause = Some(cause);
    }

    pub(crate) fn set_raw_status_code(&mut self, code: u16) {
        self.status_code = code;
    }

    pub(crate) fn set_raw_status_message(&mut self, message: Option<String>) {
        self.status_message = message;
    }

    /// Plain JSON view: `{message, statusCode, statusMessage?, data?}`.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Body sent to clients. The stack is only included in debug mode.
    pub fn response_body(&self, debug: bool) -> ErrorBody {
        let stack = if debug {
            Some(
                self.stack
                    .as_deref()
                    .unwrap_or_default()
                    .split('\n')
                    .map(|line| line.trim().to_string())
                    .collect(),
            )
        } else {
            None
        };

        ErrorBody {
            status_code: self.status_code,
            status_message: self.status_message.clone(),
            data: self.data.clone(),
            stack,
        }
    }
}

impl fmt::Display for H3Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.message.is_empty() {
            write!(f, "{}", self.message)
        } else if let Some(status_message) = &self.status_message {
            write!(f, "{}", status_message)
        } else {
            write!(f, "HTTP error {}", self.status_code)
        }
    }
}

impl StdError for H3Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn StdError + 'static))
    }
}

impl Serialize for H3Error {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Plain<'a> {
            message: &'a str,
            status_code: u16,
            #[serde(skip_serializing_if = "Option::is_none")]
            status_message: Option<&'a str>,
            #[serde(skip_serializing_if = "Option::is_none")]
            data: Option<&'a Value>,
        }

        Plain {
            message: &self.message,
            status_code: sanitize_status_code(self.status_code, DEFAULT_STATUS_CODE),
            status_message: self.status_message.as_deref(),
            data: self.data.as_ref(),
        }
        .serialize(serializer)
    }
}

/// Error JSON wire shape: `{statusCode, statusMessage?, data?, stack?}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<Vec<String>>,
}

fn capture_stack(message: &str) -> String {
    let backtrace = Backtrace::capture();
    match backtrace.status() {
        BacktraceStatus::Captured => format!("H3Error: {message}\n{backtrace}"),
        _ => format!("H3Error: {message}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let err = H3Error::new("boom");
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.message(), "boom");
        assert!(err.status_message().is_none());
        assert!(!err.is_fatal());
        assert!(!err.is_unhandled());
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn test_builder_sanitizes() {
        let err = H3Error::new("x")
            .with_status_code(42)
            .with_status_message("Bad\nThing");
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.status_message(), Some("BadThing"));
    }

    #[test]
    fn test_plain_json_omits_cause_and_stack() {
        let err = H3Error::with_status(400, "Bad Request")
            .with_data(json!({"field": "name"}))
            .with_cause(H3Error::new("inner"));
        let plain = err.to_json();
        assert_eq!(
            plain,
            json!({
                "message": "Bad Request",
                "statusCode": 400,
                "statusMessage": "Bad Request",
                "data": {"field": "name"}
            })
        );
    }

    #[test]
    fn test_response_body_stack_only_in_debug() {
        let err = H3Error::new("internal detail");
        let body = serde_json::to_value(err.response_body(false)).unwrap();
        assert_eq!(body, json!({"statusCode": 500}));

        let debug = err.response_body(true);
        let stack = debug.stack.expect("stack in debug mode");
        assert_eq!(stack[0], "H3Error: internal detail");
    }

    #[test]
    fn test_source_is_cause() {
        let err = H3Error::new("outer").with_cause(H3Error::new("inner"));
        let source = err.source().expect("cause");
        assert_eq!(source.to_string(), "inner");
    }

    #[test]
    fn test_not_found_message() {
        let err = H3Error::not_found("GET", "/missing");
        assert_eq!(err.status_code(), 404);
        assert!(err.status_message().unwrap().contains("/missing"));
    }
}
