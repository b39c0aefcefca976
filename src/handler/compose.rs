use std::fmt;
use std::sync::Arc;

use axum::http::Method;
use futures_util::future::BoxFuture;

use super::{
    EventHandler, HandlerResult, RequestHook, ResolvedRoute, ResponseBody, ResponseHook,
    WebSocketHooks,
};
use crate::event::Event;

/// Wrap a terminal handler so hooks can be attached to it.
///
/// With no hooks attached the composed handler behaves exactly like `handler`.
pub fn define_event_handler<H>(handler: H) -> ComposedHandler
where
    H: EventHandler + 'static,
{
    ComposedHandler::new(Arc::new(handler))
}

/// A terminal handler bundled with its hooks.
#[derive(Clone)]
pub struct ComposedHandler {
    handler: Arc<dyn EventHandler>,
    on_request: Vec<Arc<dyn RequestHook>>,
    on_before_response: Vec<Arc<dyn ResponseHook>>,
    websocket: Option<WebSocketHooks>,
}

impl ComposedHandler {
    pub fn new(handler: Arc<dyn EventHandler>) -> Self {
        Self {
            handler,
            on_request: Vec::new(),
            on_before_response: Vec::new(),
            websocket: None,
        }
    }

    /// Append a hook that runs before the handler.
    pub fn on_request<R>(mut self, hook: R) -> Self
    where
        R: RequestHook + 'static,
    {
        self.on_request.push(Arc::new(hook));
        self
    }

    /// Append a hook that runs after the handler and may replace its value.
    pub fn on_before_response<R>(mut self, hook: R) -> Self
    where
        R: ResponseHook + 'static,
    {
        self.on_before_response.push(Arc::new(hook));
        self
    }

    /// Attach websocket hooks; they shadow any the wrapped handler offers.
    pub fn websocket_hooks(mut self, hooks: WebSocketHooks) -> Self {
        self.websocket = Some(hooks);
        self
    }

    pub fn has_hooks(&self) -> bool {
        !self.on_request.is_empty() || !self.on_before_response.is_empty()
    }
}

impl EventHandler for ComposedHandler {
    fn handle<'a>(&'a self, event: &'a mut Event) -> BoxFuture<'a, HandlerResult> {
        if !self.has_hooks() {
            return self.handler.handle(event);
        }

        Box::pin(async move {
            for hook in &self.on_request {
                hook.call(event).await?;
            }

            let body = self.handler.handle(event).await?;
            let mut response = ResponseBody { body };

            for hook in &self.on_before_response {
                hook.call(event, &mut response).await?;
            }

            Ok(response.body)
        })
    }

    fn resolve(&self, method: &Method, path: &str) -> Option<ResolvedRoute> {
        self.handler.resolve(method, path)
    }

    fn websocket(&self) -> Option<WebSocketHooks> {
        self.websocket.clone().or_else(|| self.handler.websocket())
    }
}

impl fmt::Debug for ComposedHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComposedHandler")
            .field("on_request", &self.on_request.len())
            .field("on_before_response", &self.on_before_response.len())
            .field("websocket", &self.websocket.is_some())
            .finish()
    }
}
