//! Handler subsystem: terminal handlers, hooks and composition.
//!
//! # Data Flow
//! ```text
//! ComposedHandler::handle(event)
//!     → on_request hooks      (list order, each awaited)
//!     → terminal handler      → ResponseValue
//!     → on_before_response    (list order, may replace ResponseBody::body)
//!     → ResponseValue to the caller
//! ```
//!
//! # Design Decisions
//! - Composition never catches; the first failure propagates to the dispatcher
//! - Handlers and hooks return boxed futures so they stay object safe
//! - `resolve` and `websocket` are forwarded from the wrapped handler

mod compose;
mod dynamic;
mod lazy;

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use axum::http::Method;
use futures_util::future::BoxFuture;

use crate::error::BoxError;
use crate::event::Event;
use crate::response::ResponseValue;

pub use compose::{define_event_handler, ComposedHandler};
pub use dynamic::DynamicHandler;
pub use lazy::{lazy_event_handler, LazyHandler};

/// Outcome of a handler invocation.
pub type HandlerResult = Result<ResponseValue, BoxError>;

/// Outcome of a hook invocation.
pub type HookResult = Result<(), BoxError>;

/// Maps an [`Event`] to a response value.
///
/// Implemented for any `Fn(&mut Event) -> BoxFuture<HandlerResult>`; use
/// [`handler_fn`] to help closure type inference.
pub trait EventHandler: Send + Sync {
    fn handle<'a>(&'a self, event: &'a mut Event) -> BoxFuture<'a, HandlerResult>;

    /// Route lookup offered to upstream routers.
    fn resolve(&self, _method: &Method, _path: &str) -> Option<ResolvedRoute> {
        None
    }

    /// Upgrade hooks offered to the websocket layer.
    fn websocket(&self) -> Option<WebSocketHooks> {
        None
    }
}

impl<F> EventHandler for F
where
    F: for<'a> Fn(&'a mut Event) -> BoxFuture<'a, HandlerResult> + Send + Sync,
{
    fn handle<'a>(&'a self, event: &'a mut Event) -> BoxFuture<'a, HandlerResult> {
        self(event)
    }
}

/// Identity helper that pins a closure to the handler signature.
pub fn handler_fn<F>(f: F) -> F
where
    F: for<'a> Fn(&'a mut Event) -> BoxFuture<'a, HandlerResult> + Send + Sync,
{
    f
}

/// Runs before the terminal handler.
pub trait RequestHook: Send + Sync {
    fn call<'a>(&'a self, event: &'a mut Event) -> BoxFuture<'a, HookResult>;
}

impl<F> RequestHook for F
where
    F: for<'a> Fn(&'a mut Event) -> BoxFuture<'a, HookResult> + Send + Sync,
{
    fn call<'a>(&'a self, event: &'a mut Event) -> BoxFuture<'a, HookResult> {
        self(event)
    }
}

pub fn request_hook<F>(f: F) -> F
where
    F: for<'a> Fn(&'a mut Event) -> BoxFuture<'a, HookResult> + Send + Sync,
{
    f
}

/// Mutable holder handed to response hooks; reassigning `body` is visible to
/// later hooks and to the caller.
#[derive(Debug)]
pub struct ResponseBody {
    pub body: ResponseValue,
}

/// Runs after the terminal handler.
pub trait ResponseHook: Send + Sync {
    fn call<'a>(&'a self, event: &'a mut Event, response: &'a mut ResponseBody) -> BoxFuture<'a, HookResult>;
}

impl<F> ResponseHook for F
where
    F: for<'a> Fn(&'a mut Event, &'a mut ResponseBody) -> BoxFuture<'a, HookResult> + Send + Sync,
{
    fn call<'a>(&'a self, event: &'a mut Event, response: &'a mut ResponseBody) -> BoxFuture<'a, HookResult> {
        self(event, response)
    }
}

pub fn response_hook<F>(f: F) -> F
where
    F: for<'a> Fn(&'a mut Event, &'a mut ResponseBody) -> BoxFuture<'a, HookResult> + Send + Sync,
{
    f
}

/// Result of [`EventHandler::resolve`].
#[derive(Clone)]
pub struct ResolvedRoute {
    pub handler: Arc<dyn EventHandler>,
    pub params: HashMap<String, String>,
    /// Matched route pattern, when the router knows it.
    pub route: Option<String>,
}

impl ResolvedRoute {
    pub fn new(handler: Arc<dyn EventHandler>) -> Self {
        Self {
            handler,
            params: HashMap::new(),
            route: None,
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn with_route(mut self, route: impl Into<String>) -> Self {
        self.route = Some(route.into());
        self
    }
}

impl fmt::Debug for ResolvedRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedRoute")
            .field("params", &self.params)
            .field("route", &self.route)
            .finish_non_exhaustive()
    }
}

/// Opaque websocket hook bundle. This crate only carries it; the upgrade layer
/// downcasts it to its own type.
#[derive(Clone)]
pub struct WebSocketHooks {
    inner: Arc<dyn Any + Send + Sync>,
}

impl WebSocketHooks {
    pub fn new<T: Any + Send + Sync>(hooks: T) -> Self {
        Self { inner: Arc::new(hooks) }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    pub fn ptr_eq(&self, other: &WebSocketHooks) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for WebSocketHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WebSocketHooks(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::IncomingRequest;

    #[tokio::test]
    async fn test_closure_is_a_handler() {
        let handler = handler_fn(|event| {
            Box::pin(async move { Ok(ResponseValue::text(format!("path={}", event.pathname()))) })
        });
        let mut event = Event::new(IncomingRequest::new(Method::GET, "http://localhost/a"));
        let value = handler.handle(&mut event).await.unwrap();
        assert!(matches!(value, ResponseValue::Text(ref t) if t == "path=/a"));
        assert!(handler.resolve(&Method::GET, "/a").is_none());
        assert!(handler.websocket().is_none());
    }

    #[test]
    fn test_websocket_hooks_downcast() {
        struct Hooks {
            protocol: &'static str,
        }
        let hooks = WebSocketHooks::new(Hooks { protocol: "chat" });
        assert_eq!(hooks.downcast_ref::<Hooks>().unwrap().protocol, "chat");
        assert!(hooks.downcast_ref::<String>().is_none());
        assert!(hooks.ptr_eq(&hooks.clone()));
    }
}
