//! Application dispatcher.
//!
//! # Data Flow
//! ```text
//! Event
//!     → on_request hooks (app level)
//!     → handler (usually a ComposedHandler with its own hooks)
//!     → on_before_response hooks (app level)
//!     → serialize → PreparedResponse
//!
//! on failure anywhere above:
//!     → normalize_error (non-H3Error failures are marked unhandled)
//!     → on_error hooks
//!     → on_before_response hooks with the error as body
//!     → serialize
//! ```
//!
//! # Design Decisions
//! - `dispatch` never fails; every outcome becomes a response
//! - Unhandled and fatal errors are logged here and nowhere else

use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::config::AppConfig;
use crate::error::{is_h3_error, normalize_error, BoxError, H3Error};
use crate::event::{Event, IncomingRequest};
use crate::handler::{EventHandler, HandlerResult, RequestHook, ResponseBody, ResponseHook};
use crate::response::{serialize, PreparedResponse, ResponseValue};

/// Observes failures before they are serialized.
pub trait ErrorHook: Send + Sync {
    fn call<'a>(&'a self, error: &'a H3Error, event: &'a mut Event) -> BoxFuture<'a, ()>;
}

impl<F> ErrorHook for F
where
    F: for<'a> Fn(&'a H3Error, &'a mut Event) -> BoxFuture<'a, ()> + Send + Sync,
{
    fn call<'a>(&'a self, error: &'a H3Error, event: &'a mut Event) -> BoxFuture<'a, ()> {
        self(error, event)
    }
}

pub fn error_hook<F>(f: F) -> F
where
    F: for<'a> Fn(&'a H3Error, &'a mut Event) -> BoxFuture<'a, ()> + Send + Sync,
{
    f
}

/// Process-wide hooks around one root handler.
#[derive(Clone)]
pub struct App {
    config: Arc<AppConfig>,
    handler: Arc<dyn EventHandler>,
    on_request: Vec<Arc<dyn RequestHook>>,
    on_error: Vec<Arc<dyn ErrorHook>>,
    on_before_response: Vec<Arc<dyn ResponseHook>>,
}

impl App {
    pub fn new<H>(config: Arc<AppConfig>, handler: H) -> Self
    where
        H: EventHandler + 'static,
    {
        Self {
            config,
            handler: Arc::new(handler),
            on_request: Vec::new(),
            on_error: Vec::new(),
            on_before_response: Vec::new(),
        }
    }

    pub fn on_request<R>(mut self, hook: R) -> Self
    where
        R: RequestHook + 'static,
    {
        self.on_request.push(Arc::new(hook));
        self
    }

    pub fn on_error<R>(mut self, hook: R) -> Self
    where
        R: ErrorHook + 'static,
    {
        self.on_error.push(Arc::new(hook));
        self
    }

    pub fn on_before_response<R>(mut self, hook: R) -> Self
    where
        R: ResponseHook + 'static,
    {
        self.on_before_response.push(Arc::new(hook));
        self
    }

    pub fn config(&self) -> &Arc<AppConfig> {
        &self.config
    }

    /// Build an event for `request` and dispatch it.
    pub async fn handle(&self, request: IncomingRequest) -> PreparedResponse {
        let mut event = Event::new(request);
        self.dispatch(&mut event).await
    }

    /// Run the pipeline for one event and serialize the outcome.
    pub async fn dispatch(&self, event: &mut Event) -> PreparedResponse {
        tracing::debug!(method = %event.method(), path = %event.pathname(), "Dispatching event");

        let value = match self.run(event).await {
            Ok(value) => value,
            Err(err) => self.recover(err, event).await,
        };

        serialize(value, event, &self.config)
    }

    async fn run(&self, event: &mut Event) -> HandlerResult {
        for hook in &self.on_request {
            hook.call(event).await?;
        }

        let body = self.handler.handle(event).await?;
        let mut response = ResponseBody { body };

        for hook in &self.on_before_response {
            hook.call(event, &mut response).await?;
        }

        Ok(response.body)
    }

    async fn recover(&self, err: BoxError, event: &mut Event) -> ResponseValue {
        let unhandled = !is_h3_error(&err);
        let mut error = normalize_error(err);
        if unhandled {
            error = error.with_unhandled(true);
        }

        for hook in &self.on_error {
            hook.call(&error, event).await;
        }

        if error.is_unhandled() || error.is_fatal() {
            tracing::error!(
                method = %event.method(),
                path = %event.pathname(),
                status = error.status_code(),
                fatal = error.is_fatal(),
                error = %error,
                "Unhandled error while handling request"
            );
        }

        let mut response = ResponseBody {
            body: ResponseValue::Error(error),
        };
        for hook in &self.on_before_response {
            if let Err(hook_err) = hook.call(event, &mut response).await {
                tracing::warn!(error = %hook_err, "Response hook failed while sending an error");
            }
        }
        response.body
    }
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("debug", &self.config.debug)
            .field("on_request", &self.on_request.len())
            .field("on_error", &self.on_error.len())
            .field("on_before_response", &self.on_before_response.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{define_event_handler, handler_fn, request_hook, response_hook};
    use axum::http::{HeaderValue, Method, StatusCode};
    use serde_json::{json, Value};
    use std::io;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn config(debug: bool) -> Arc<AppConfig> {
        Arc::new(AppConfig {
            debug,
            ..AppConfig::default()
        })
    }

    fn get(path: &str) -> IncomingRequest {
        IncomingRequest::new(Method::GET, format!("http://localhost{path}"))
    }

    fn body_json(response: &PreparedResponse) -> Value {
        serde_json::from_str(response.body.as_text().unwrap()).unwrap()
    }

    fn failing(debug: bool) -> App {
        App::new(
            config(debug),
            handler_fn(|_event| {
                Box::pin(async {
                    Err::<ResponseValue, BoxError>(Box::new(io::Error::other("boom")))
                })
            }),
        )
    }

    #[tokio::test]
    async fn test_not_found_sentinel_end_to_end() {
        let app = App::new(
            config(false),
            handler_fn(|_event| Box::pin(async { Ok(ResponseValue::NotFound) })),
        );
        let response = app.handle(get("/missing")).await;
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        let body = body_json(&response);
        assert_eq!(body["statusCode"], 404);
        assert!(body["statusMessage"].as_str().unwrap().contains("/missing"));
    }

    #[tokio::test]
    async fn test_plain_error_is_hidden_outside_debug() {
        let response = failing(false).handle(get("/")).await;
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        let text = response.body.as_text().unwrap().to_string();
        assert!(!text.contains("boom"));
        assert_eq!(body_json(&response), json!({"statusCode": 500}));
    }

    #[tokio::test]
    async fn test_plain_error_has_stack_in_debug() {
        let response = failing(true).handle(get("/")).await;
        let body = body_json(&response);
        assert_eq!(body["statusCode"], 500);
        let stack = body["stack"].as_array().expect("stack in debug mode");
        assert!(stack[0].as_str().unwrap().contains("boom"));
    }

    #[tokio::test]
    async fn test_on_error_sees_unhandled_marker() {
        let seen = Arc::new(AtomicBool::new(false));
        let flag = seen.clone();
        let app = failing(false).on_error(error_hook(move |error, _event| {
            let flag = flag.clone();
            let unhandled = error.is_unhandled();
            Box::pin(async move { flag.store(unhandled, Ordering::SeqCst) })
        }));
        app.handle(get("/")).await;
        assert!(seen.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_h3_error_is_not_marked_unhandled() {
        let seen = Arc::new(AtomicBool::new(true));
        let flag = seen.clone();
        let app = App::new(
            config(false),
            handler_fn(|_event| {
                Box::pin(async {
                    Err::<ResponseValue, BoxError>(Box::new(H3Error::with_status(403, "Forbidden")))
                })
            }),
        )
        .on_error(error_hook(move |error, _event| {
            let flag = flag.clone();
            let unhandled = error.is_unhandled();
            Box::pin(async move { flag.store(unhandled, Ordering::SeqCst) })
        }));

        let response = app.handle(get("/")).await;
        assert_eq!(response.status, StatusCode::FORBIDDEN);
        assert_eq!(response.status_text.as_deref(), Some("Forbidden"));
        assert!(!seen.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_app_hooks_wrap_composed_handler() {
        let handler = define_event_handler(handler_fn(|event| {
            Box::pin(async move {
                let tag = event.context.get::<&str>("tag").copied().unwrap_or("none");
                Ok(ResponseValue::json(&json!({ "tag": tag })))
            })
        }));

        let app = App::new(config(false), handler)
            .on_request(request_hook(|event| {
                Box::pin(async move {
                    event.context.insert("tag", "app");
                    Ok(())
                })
            }))
            .on_before_response(response_hook(|event, _response| {
                Box::pin(async move {
                    event
                        .response
                        .headers
                        .insert("x-powered-by", HeaderValue::from_static("h3-core"));
                    Ok(())
                })
            }));

        let response = app.handle(get("/")).await;
        assert_eq!(body_json(&response), json!({"tag": "app"}));
        assert_eq!(response.header("x-powered-by"), Some("h3-core"));
    }

    #[tokio::test]
    async fn test_response_hook_sees_error_body() {
        let app = failing(false).on_before_response(response_hook(|_event, response| {
            Box::pin(async move {
                if let ResponseValue::Error(err) = &response.body {
                    response.body = ResponseValue::Error(err.clone().with_status_code(503));
                }
                Ok(())
            })
        }));
        let response = app.handle(get("/")).await;
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_failing_request_hook_short_circuits() {
        let app = App::new(
            config(false),
            handler_fn(|_event| Box::pin(async { Ok(ResponseValue::text("unreachable")) })),
        )
        .on_request(request_hook(|_event| {
            Box::pin(async { Err::<(), BoxError>(Box::new(H3Error::with_status(429, "Slow down"))) })
        }));

        let response = app.handle(get("/")).await;
        assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body_json(&response)["statusMessage"], "Slow down");
    }
}
