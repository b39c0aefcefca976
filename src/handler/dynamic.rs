use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use axum::http::Method;
use futures_util::future::BoxFuture;

use super::{EventHandler, HandlerResult, ResolvedRoute, WebSocketHooks};
use crate::event::Event;
use crate::response::ResponseValue;

struct Slot(Arc<dyn EventHandler>);

/// A handler whose target can be replaced at runtime.
///
/// Each call reads the current target once, so an in-flight request finishes
/// on the handler it started with. With no target set, calls yield an empty
/// response.
pub struct DynamicHandler {
    current: ArcSwapOption<Slot>,
}

impl DynamicHandler {
    pub fn new() -> Self {
        Self {
            current: ArcSwapOption::empty(),
        }
    }

    pub fn with_handler<H>(handler: H) -> Self
    where
        H: EventHandler + 'static,
    {
        let dynamic = Self::new();
        dynamic.set(handler);
        dynamic
    }

    /// Replace the target. Last write wins.
    pub fn set<H>(&self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.set_shared(Arc::new(handler));
    }

    pub fn set_shared(&self, handler: Arc<dyn EventHandler>) {
        self.current.store(Some(Arc::new(Slot(handler))));
        tracing::debug!("Dynamic handler target replaced");
    }

    pub fn clear(&self) {
        self.current.store(None);
    }

    pub fn is_set(&self) -> bool {
        self.current.load().is_some()
    }

    fn target(&self) -> Option<Arc<dyn EventHandler>> {
        self.current.load_full().map(|slot| slot.0.clone())
    }
}

impl Default for DynamicHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHandler for DynamicHandler {
    fn handle<'a>(&'a self, event: &'a mut Event) -> BoxFuture<'a, HandlerResult> {
        let target = self.target();
        Box::pin(async move {
            match target {
                Some(handler) => handler.handle(event).await,
                None => Ok(ResponseValue::Empty),
            }
        })
    }

    fn resolve(&self, method: &Method, path: &str) -> Option<ResolvedRoute> {
        self.target()?.resolve(method, path)
    }

    fn websocket(&self) -> Option<WebSocketHooks> {
        self.target()?.websocket()
    }
}

impl fmt::Debug for DynamicHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicHandler")
            .field("is_set", &self.is_set())
            .finish()
    }
}
