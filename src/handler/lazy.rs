use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::http::Method;
use futures_util::future::{BoxFuture, FutureExt, Shared};

use super::{EventHandler, HandlerResult, ResolvedRoute, WebSocketHooks};
use crate::error::{is_h3_error, normalize_error, BoxError, H3Error};
use crate::event::Event;

type LoadResult = Result<Arc<dyn EventHandler>, H3Error>;
type PendingLoad = Shared<BoxFuture<'static, LoadResult>>;
type Loader = Box<dyn Fn() -> BoxFuture<'static, LoadResult> + Send + Sync>;

/// Build a handler that is loaded on first use.
pub fn lazy_event_handler<F, Fut, H>(loader: F) -> LazyHandler
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<H, BoxError>> + Send + 'static,
    H: EventHandler + 'static,
{
    LazyHandler {
        loader: Box::new(move || {
            loader()
                .map(|loaded| match loaded {
                    Ok(handler) => Ok(Arc::new(handler) as Arc<dyn EventHandler>),
                    Err(err) => Err(load_error(err)),
                })
                .boxed()
        }),
        state: Mutex::new(State::Unloaded),
    }
}

/// Loader failures that are not already HTTP errors stay marked unhandled.
fn load_error(err: BoxError) -> H3Error {
    let unhandled = !is_h3_error(&err);
    let error = normalize_error(err);
    if unhandled {
        error.with_unhandled(true)
    } else {
        error
    }
}

enum State {
    Unloaded,
    Loading(PendingLoad),
    Ready(Arc<dyn EventHandler>),
}

/// A handler resolved on its first invocation and memoized afterwards.
///
/// Concurrent first calls await a single load, whether it succeeds or fails.
/// After a failure the cell returns to unloaded and the next call retries.
pub struct LazyHandler {
    loader: Loader,
    state: Mutex<State>,
}

impl LazyHandler {
    pub fn is_loaded(&self) -> bool {
        matches!(*self.lock(), State::Ready(_))
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn loaded(&self) -> Option<Arc<dyn EventHandler>> {
        match &*self.lock() {
            State::Ready(handler) => Some(handler.clone()),
            _ => None,
        }
    }

    async fn load(&self) -> LoadResult {
        let pending = {
            let mut state = self.lock();
            match &*state {
                State::Ready(handler) => return Ok(handler.clone()),
                State::Loading(pending) => pending.clone(),
                State::Unloaded => {
                    tracing::debug!("Loading lazy handler");
                    let pending = (self.loader)().shared();
                    *state = State::Loading(pending.clone());
                    pending
                }
            }
        };

        let result = pending.clone().await;

        let mut state = self.lock();
        if let State::Loading(current) = &*state {
            if current.ptr_eq(&pending) {
                *state = match &result {
                    Ok(handler) => State::Ready(handler.clone()),
                    Err(err) => {
                        tracing::warn!(error = %err, "Lazy handler failed to load");
                        State::Unloaded
                    }
                };
            }
        }
        result
    }
}

impl EventHandler for LazyHandler {
    fn handle<'a>(&'a self, event: &'a mut Event) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            let handler = self.load().await?;
            handler.handle(event).await
        })
    }

    fn resolve(&self, method: &Method, path: &str) -> Option<ResolvedRoute> {
        self.loaded()?.resolve(method, path)
    }

    fn websocket(&self) -> Option<WebSocketHooks> {
        self.loaded()?.websocket()
    }
}

impl fmt::Debug for LazyHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyHandler")
            .field("loaded", &self.is_loaded())
            .finish()
    }
}
