//! Transport-ready response pieces.

use std::fmt;
use std::io;
use std::pin::Pin;

use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use bytes::Bytes;
use futures_util::{stream, Stream};

/// A byte stream body (request or response).
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, io::Error>> + Send>>;

/// Box any compatible stream as a [`BodyStream`].
pub fn body_stream<S>(stream: S) -> BodyStream
where
    S: Stream<Item = Result<Bytes, io::Error>> + Send + 'static,
{
    Box::pin(stream)
}

/// Final response body.
pub enum Body {
    Empty,
    Text(String),
    Bytes(Bytes),
    Stream(BodyStream),
}

impl Body {
    pub fn is_empty(&self) -> bool {
        match self {
            Body::Empty => true,
            Body::Text(text) => text.is_empty(),
            Body::Bytes(bytes) => bytes.is_empty(),
            Body::Stream(_) => false,
        }
    }

    /// Buffered body as text, if it is buffered and valid UTF-8.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Body::Empty => Some(""),
            Body::Text(text) => Some(text),
            Body::Bytes(bytes) => std::str::from_utf8(bytes).ok(),
            Body::Stream(_) => None,
        }
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, Body::Stream(_))
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Empty => f.write_str("Empty"),
            Body::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Body::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Body::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// A sized, typed payload that is sent as a stream.
pub struct Blob {
    size: u64,
    content_type: String,
    stream: BodyStream,
}

impl Blob {
    /// In-memory blob.
    pub fn new(data: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        let data = data.into();
        Self {
            size: data.len() as u64,
            content_type: content_type.into(),
            stream: Box::pin(stream::once(async move { Ok(data) })),
        }
    }

    /// Blob backed by an existing stream of known length.
    pub fn from_stream(size: u64, content_type: impl Into<String>, stream: BodyStream) -> Self {
        Self {
            size,
            content_type: content_type.into(),
            stream,
        }
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn into_stream(self) -> BodyStream {
        self.stream
    }
}

impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blob")
            .field("size", &self.size)
            .field("content_type", &self.content_type)
            .finish()
    }
}

/// `{status, statusText, headers, body}` as handed to the transport.
#[derive(Debug)]
pub struct PreparedResponse {
    pub status: StatusCode,
    pub status_text: Option<String>,
    pub headers: HeaderMap,
    pub body: Body,
}

impl PreparedResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            status_text: None,
            headers: HeaderMap::new(),
            body: Body::Empty,
        }
    }

    /// 200 with no headers and no body.
    pub fn empty() -> Self {
        Self::new(StatusCode::OK)
    }

    pub fn with_status_text(mut self, text: impl Into<String>) -> Self {
        self.status_text = Some(text.into());
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}
