//! HTTP request-handling core: events, composable handlers, response
//! serialization, error normalization and server-sent events, with an
//! axum/hyper transport adapter.

pub mod app;
pub mod config;
pub mod error;
pub mod event;
pub mod handler;
pub mod http;
pub mod observability;
pub mod response;
pub mod sse;

pub use app::App;
pub use config::schema::AppConfig;
pub use error::{normalize_error, BoxError, H3Error};
pub use event::{Event, IncomingRequest};
pub use handler::{define_event_handler, handler_fn, EventHandler};
pub use http::HttpServer;
pub use response::{serialize, ResponseValue};
pub use sse::{EventStream, EventStreamMessage};
