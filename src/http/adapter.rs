//! Conversion between axum/hyper types and the core's request/response types.
//!
//! # Responsibilities
//! - Build an absolute request URL from the `Host` header or URI authority
//! - Carry method, headers, version, peer address and extensions across
//! - Expose the request body as a byte stream
//! - Turn a `PreparedResponse` into an axum response, reason phrase included

use std::io;
use std::net::SocketAddr;

use axum::body::Body as AxumBody;
use axum::http::header::HOST;
use axum::http::{HeaderMap, HeaderValue, Request, Uri};
use axum::response::Response;
use futures_util::TryStreamExt;
use hyper::ext::ReasonPhrase;

use crate::event::IncomingRequest;
use crate::response::{Body, PreparedResponse};

/// Header carrying the request correlation id.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Absolute URL for a request target.
pub fn absolute_url(uri: &Uri, headers: &HeaderMap) -> String {
    let scheme = uri.scheme_str().unwrap_or("http");
    let host = headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .filter(|h| !h.is_empty())
        .or_else(|| uri.authority().map(|a| a.as_str()))
        .unwrap_or("localhost");
    let target = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    format!("{scheme}://{host}{target}")
}

/// Incoming `x-request-id`, or a fresh UUID v4.
pub fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

/// Convert an axum request into the transport-neutral request.
pub fn into_incoming(request: Request<AxumBody>, remote_addr: Option<SocketAddr>) -> IncomingRequest {
    let (parts, body) = request.into_parts();
    let url = absolute_url(&parts.uri, &parts.headers);
    let stream = body.into_data_stream().map_err(io::Error::other);

    let mut incoming = IncomingRequest::new(parts.method, url)
        .with_headers(parts.headers)
        .with_version(parts.version)
        .with_body(Box::pin(stream));
    incoming.remote_addr = remote_addr;
    incoming.extensions = parts.extensions;
    incoming
}

/// Convert a serialized response into an axum response.
pub fn into_response(prepared: PreparedResponse) -> Response {
    let body = match prepared.body {
        Body::Empty => AxumBody::empty(),
        Body::Text(text) => AxumBody::from(text),
        Body::Bytes(bytes) => AxumBody::from(bytes),
        Body::Stream(stream) => AxumBody::from_stream(stream),
    };

    let mut response = Response::new(body);
    *response.status_mut() = prepared.status;
    *response.headers_mut() = prepared.headers;

    if let Some(text) = prepared.status_text.filter(|t| !t.is_empty()) {
        if prepared.status.canonical_reason() != Some(text.as_str()) {
            match ReasonPhrase::try_from(text) {
                Ok(reason) => {
                    response.extensions_mut().insert(reason);
                }
                Err(e) => tracing::debug!(error = ?e, "Dropping unusable reason phrase"),
            }
        }
    }

    response
}

/// Echo the request id on the response unless a handler already set one.
pub fn attach_request_id(response: &mut Response, request_id: &str) {
    if response.headers().contains_key(X_REQUEST_ID) {
        return;
    }
    if let Ok(value) = HeaderValue::from_str(request_id) {
        response.headers_mut().insert(X_REQUEST_ID, value);
    }
}
