//! Event subsystem: one request/response pair.
//!
//! # Data Flow
//! ```text
//! transport adapter
//!     → IncomingRequest (method, absolute url, headers, body, peer)
//!     → Event::new
//!         request facets   (split.rs fast path, lazy url::Url, query.rs)
//!         response state   (response.rs, mutated by hooks and handlers)
//!         context bag      (context.rs)
//!     → handler pipeline
//!     → response serialization
//! ```
//!
//! # Design Decisions
//! - Request facets are read-only after construction
//! - `pathname`/`query_string` slice the raw URL when that provably matches a
//!   full parse; otherwise (and once `url()` has been built) they read from the
//!   parsed `Url`, so the accessors never disagree
//! - `query` and `url` are computed at most once

pub mod context;
pub mod query;
pub mod response;
mod split;

use std::collections::HashMap;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::{LazyLock, OnceLock};

use axum::http::{Extensions, HeaderMap, HeaderName, HeaderValue, Method, Version};
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use url::{Position, Url};

use crate::error::H3Error;
use crate::response::BodyStream;
use split::{split_fast, Split};

pub use context::Context;
pub use query::{Query, QueryValue};
pub use response::ResponseState;

static FALLBACK_BASE: LazyLock<Url> =
    LazyLock::new(|| Url::parse("http://localhost").expect("fallback base is a valid URL"));

/// What the transport hands over for one request.
pub struct IncomingRequest {
    pub method: Method,
    /// Absolute request URL.
    pub url: String,
    pub headers: HeaderMap,
    pub version: Version,
    pub body: Option<BodyStream>,
    pub remote_addr: Option<SocketAddr>,
    /// Native request extensions from the transport, passed through untouched.
    pub extensions: Extensions,
}

impl IncomingRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            version: Version::HTTP_11,
            body: None,
            remote_addr: None,
            extensions: Extensions::new(),
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    pub fn with_body(mut self, body: BodyStream) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }
}

/// Read-only request facets.
#[derive(Debug)]
pub struct RequestView {
    method: Method,
    raw_url: String,
    headers: HeaderMap,
    version: Version,
    remote_addr: Option<SocketAddr>,
    extensions: Extensions,
    split: Option<Split>,
    url: OnceLock<Url>,
    query: OnceLock<Query>,
}

impl RequestView {
    fn new(request: &mut IncomingRequest) -> Self {
        let raw_url = std::mem::take(&mut request.url);
        let split = split_fast(&raw_url);
        let url = OnceLock::new();
        if split.is_none() {
            let _ = url.set(parse_url(&raw_url));
        }

        Self {
            method: normalize_method(&request.method),
            raw_url,
            headers: std::mem::take(&mut request.headers),
            version: request.version,
            remote_addr: request.remote_addr,
            extensions: std::mem::take(&mut request.extensions),
            split,
            url,
            query: OnceLock::new(),
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The URL string exactly as received.
    pub fn raw_url(&self) -> &str {
        &self.raw_url
    }

    pub fn pathname(&self) -> &str {
        match (self.url.get(), self.split) {
            (Some(url), _) => url.path(),
            (None, Some(split)) => &self.raw_url[split.path_start..split.query_start],
            (None, None) => self.url().path(),
        }
    }

    /// Raw query string including its leading `?`, or `""`.
    pub fn query_string(&self) -> &str {
        match (self.url.get(), self.split) {
            (Some(url), _) => &url[Position::AfterPath..Position::AfterQuery],
            (None, Some(split)) => &self.raw_url[split.query_start..],
            (None, None) => {
                let url = self.url();
                &url[Position::AfterPath..Position::AfterQuery]
            }
        }
    }

    pub fn query(&self) -> &Query {
        self.query.get_or_init(|| Query::parse(self.query_string()))
    }

    /// Fully parsed URL, built on first access.
    pub fn url(&self) -> &Url {
        self.url.get_or_init(|| parse_url(&self.raw_url))
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }
}

fn normalize_method(method: &Method) -> Method {
    let raw = method.as_str();
    if raw.bytes().any(|b| b.is_ascii_lowercase()) {
        Method::from_bytes(raw.to_ascii_uppercase().as_bytes()).unwrap_or_else(|_| method.clone())
    } else {
        method.clone()
    }
}

fn parse_url(raw: &str) -> Url {
    let base = &*FALLBACK_BASE;
    match Url::options().base_url(Some(base)).parse(raw) {
        Ok(url) => url,
        Err(error) => {
            tracing::warn!(url = %raw, error = %error, "Unparseable request URL, using fallback base");
            base.join(request_target(raw)).unwrap_or_else(|_| base.clone())
        }
    }
}

/// Path, query and fragment of `raw` with any scheme and authority removed.
fn request_target(raw: &str) -> &str {
    match raw.find("://") {
        Some(i) => {
            let rest = &raw[i + 3..];
            rest.find(['/', '?', '#']).map_or("/", |offset| &rest[offset..])
        }
        None => raw,
    }
}

/// One request travelling through the handler pipeline.
pub struct Event {
    request: RequestView,
    body: Option<BodyStream>,
    body_consumed: bool,
    /// Response status and headers; applied at serialization time.
    pub response: ResponseState,
    /// Per-request values shared between hooks and handlers.
    pub context: Context,
}

impl Event {
    pub fn new(request: IncomingRequest) -> Self {
        Self::with_context(request, Context::new())
    }

    /// Build an event with a pre-seeded context.
    pub fn with_context(mut request: IncomingRequest, context: Context) -> Self {
        let view = RequestView::new(&mut request);
        Self {
            request: view,
            body: request.body.take(),
            body_consumed: false,
            response: ResponseState::default(),
            context,
        }
    }

    pub fn request(&self) -> &RequestView {
        &self.request
    }

    pub fn method(&self) -> &Method {
        self.request.method()
    }

    pub fn pathname(&self) -> &str {
        self.request.pathname()
    }

    pub fn query_string(&self) -> &str {
        self.request.query_string()
    }

    /// Path including the query string.
    pub fn path(&self) -> String {
        format!("{}{}", self.pathname(), self.query_string())
    }

    pub fn query(&self) -> &Query {
        self.request.query()
    }

    pub fn url(&self) -> &Url {
        self.request.url()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.request.headers()
    }

    /// Whether the request came over a multiplexed (HTTP/2 or later) transport.
    pub fn is_multiplexed(&self) -> bool {
        self.request.version() >= Version::HTTP_2
            || self.request.headers().contains_key(":path")
            || self.request.headers().contains_key(":method")
    }

    /// Route parameter captured by an upstream router.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.context
            .get::<HashMap<String, String>>(context::PARAMS)
            .and_then(|params| params.get(name))
            .map(String::as_str)
    }

    /// Client address: the `client_address` context override, else the peer address.
    pub fn ip(&self) -> Option<String> {
        if let Some(addr) = self.context.get::<String>(context::CLIENT_ADDRESS) {
            return Some(addr.clone());
        }
        self.request.remote_addr().map(|addr| addr.ip().to_string())
    }

    /// Like [`Event::ip`], but trusts the first `x-forwarded-for` entry first.
    pub fn forwarded_ip(&self) -> Option<String> {
        let forwarded = self
            .headers()
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| v.parse::<IpAddr>().is_ok());
        match forwarded {
            Some(ip) => Some(ip.to_string()),
            None => self.ip(),
        }
    }

    /// Collect the request body, failing with 413 past `max_size` bytes.
    ///
    /// The body can only be read once; later calls fail with 400.
    pub async fn read_body(&mut self, max_size: usize) -> Result<Bytes, H3Error> {
        if self.body_consumed {
            return Err(H3Error::with_status(400, "Request body already consumed"));
        }
        self.body_consumed = true;

        let Some(mut stream) = self.body.take() else {
            return Ok(Bytes::new());
        };

        let mut collected = BytesMut::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                H3Error::with_status(400, "Failed to read request body").with_cause(e)
            })?;
            if collected.len() + chunk.len() > max_size {
                return Err(H3Error::with_status(413, "Request body too large")
                    .with_data(serde_json::json!({ "limit": max_size })));
            }
            collected.extend_from_slice(&chunk);
        }

        Ok(collected.freeze())
    }

    /// Read and deserialize a JSON body.
    pub async fn read_json<T: DeserializeOwned>(&mut self, max_size: usize) -> Result<T, H3Error> {
        let bytes = self.read_body(max_size).await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| H3Error::with_status(400, "Invalid JSON body").with_cause(e))
    }

    /// `"[METHOD] url"` for log lines.
    pub fn to_debug_string(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.method(), self.request.raw_url())
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("request", &self.request)
            .field("response", &self.response)
            .field("context", &self.context)
            .finish()
    }
}
