//! Handler value → transport response.
//!
//! # Responsibilities
//! - Dispatch on [`ResponseValue`] and produce a body
//! - Infer `content-type` / `content-length` where the value implies them
//! - Merge event response state into pre-built responses
//! - Enforce null-body rules last, whatever produced the body
//!
//! # Design Decisions
//! - Headers set on the event win over headers implied by the value
//! - Error bodies always carry `application/json` and the error's status
//! - This function never fails; serialization problems become error bodies

use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE, SET_COOKIE};
use axum::http::{HeaderValue, Method, StatusCode};
use serde::Serialize;
use serde_json::Value;

use super::body::{Body, PreparedResponse};
use super::value::ResponseValue;
use crate::config::AppConfig;
use crate::error::H3Error;
use crate::event::Event;

/// Content type for JSON and error bodies.
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Status codes whose responses never carry a body.
pub const NULL_BODY_STATUSES: [u16; 6] = [100, 101, 102, 204, 205, 304];

pub fn is_null_body_status(status: StatusCode) -> bool {
    NULL_BODY_STATUSES.contains(&status.as_u16())
}

/// Turn a handler value plus the event's response state into the final response.
pub fn serialize(value: ResponseValue, event: &mut Event, config: &AppConfig) -> PreparedResponse {
    let debug = config.debug;
    let is_head = *event.method() == Method::HEAD;

    let prepared = match value {
        ResponseValue::Handled => return PreparedResponse::empty(),
        ResponseValue::Response(response) => merge_prebuilt(response, event),
        ResponseValue::Empty | ResponseValue::Json(Value::Null) => from_event(event, Body::Empty),
        ResponseValue::NotFound => {
            let err = H3Error::not_found(event.method().as_str(), event.pathname());
            error_response(err, event, debug)
        }
        ResponseValue::Text(text) => from_event(event, Body::Text(text)),
        ResponseValue::Bytes(bytes) => {
            set_default_header(event, CONTENT_LENGTH.as_str(), &bytes.len().to_string());
            from_event(event, Body::Bytes(bytes))
        }
        ResponseValue::Error(err) => error_response(err, event, debug),
        ResponseValue::Json(value) => {
            set_default_header(event, CONTENT_TYPE.as_str(), JSON_CONTENT_TYPE);
            let body = Body::Text(to_json_text(&value, debug));
            from_event(event, body)
        }
        ResponseValue::BigInt(n) => {
            set_default_header(event, CONTENT_TYPE.as_str(), JSON_CONTENT_TYPE);
            from_event(event, Body::Text(n.to_string()))
        }
        ResponseValue::Blob(blob) => {
            set_default_header(event, CONTENT_TYPE.as_str(), blob.content_type());
            set_default_header(event, CONTENT_LENGTH.as_str(), &blob.size().to_string());
            from_event(event, Body::Stream(blob.into_stream()))
        }
        ResponseValue::Unsendable(kind) => {
            let err = H3Error::with_status(500, format!("Cannot send {kind} as response"));
            error_response(err, event, debug)
        }
        ResponseValue::Stream(stream) => from_event(event, Body::Stream(stream)),
    };

    finalize(prepared, is_head)
}

fn from_event(event: &Event, body: Body) -> PreparedResponse {
    PreparedResponse {
        status: event.response.status.unwrap_or(StatusCode::OK),
        status_text: event.response.status_text.clone(),
        headers: event.response.headers.clone(),
        body,
    }
}

fn set_default_header(event: &mut Event, name: &'static str, value: &str) {
    if event.response.headers.contains_key(name) {
        return;
    }
    if let Ok(value) = HeaderValue::from_str(value) {
        event.response.headers.insert(name, value);
    }
}

fn error_response(err: H3Error, event: &mut Event, debug: bool) -> PreparedResponse {
    event.response.status = StatusCode::from_u16(err.status_code()).ok();
    event.response.status_text = err.status_message().map(str::to_string);
    event
        .response
        .headers
        .insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
    event.response.headers.remove(CONTENT_LENGTH);

    let body = to_json_text(&err.response_body(debug), debug);
    from_event(event, Body::Text(body))
}

fn to_json_text<T: Serialize>(value: &T, pretty: bool) -> String {
    let text = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    text.unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to serialize JSON response body");
        String::new()
    })
}

fn merge_prebuilt(mut response: PreparedResponse, event: &Event) -> PreparedResponse {
    let state = &event.response;
    if !state.has_overrides() {
        return response;
    }

    if let Some(status) = state.status {
        response.status = status;
    }
    if let Some(text) = &state.status_text {
        response.status_text = Some(text.clone());
    }

    for name in state.headers.keys() {
        if *name != SET_COOKIE {
            response.headers.remove(name);
        }
        for value in state.headers.get_all(name) {
            response.headers.append(name.clone(), value.clone());
        }
    }

    response
}

fn finalize(mut prepared: PreparedResponse, is_head: bool) -> PreparedResponse {
    if is_head || is_null_body_status(prepared.status) {
        prepared.body = Body::Empty;
    }
    if prepared.status == StatusCode::NO_CONTENT {
        prepared.headers.remove(CONTENT_LENGTH);
    }
    prepared
}
