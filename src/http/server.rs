//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router that funnels every request into the App
//! - Wire up middleware (tracing)
//! - Bind server to listener and shut down gracefully
//! - Stamp each request with a request ID and log its completion

use std::future::Future;
use std::net::SocketAddr;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    response::Response,
    Router,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::app::App;
use crate::event::{context, Event};
use crate::http::adapter::{attach_request_id, into_incoming, into_response, request_id};

/// HTTP server hosting one [`App`].
pub struct HttpServer {
    router: Router,
    app: App,
}

impl HttpServer {
    /// Create a new HTTP server around the given app.
    pub fn new(app: App) -> Self {
        let router = Self::build_router(app.clone());
        Self { router, app }
    }

    /// Build the Axum router with all middleware layers.
    pub fn build_router(app: App) -> Router {
        Router::new()
            .fallback(dispatch_handler)
            .with_state(app)
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server until Ctrl+C.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        self.run_until(listener, shutdown_signal()).await
    }

    /// Run the server until `shutdown` resolves.
    pub async fn run_until<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            debug = self.app.config().debug,
            "HTTP server starting"
        );

        let service = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, service)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn app(&self) -> &App {
        &self.app
    }
}

/// Single entry point: every method and path goes through the App.
async fn dispatch_handler(State(app): State<App>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let remote_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let request_id = request_id(request.headers());

    let mut event = Event::new(into_incoming(request, remote_addr));
    event.context.insert(context::REQUEST_ID, request_id.clone());

    let prepared = app.dispatch(&mut event).await;
    let status = prepared.status;

    tracing::info!(
        request_id = %request_id,
        method = %event.method(),
        path = %event.pathname(),
        status = status.as_u16(),
        elapsed_ms = start_time.elapsed().as_millis() as u64,
        "Request completed"
    );

    let mut response = into_response(prepared);
    attach_request_id(&mut response, &request_id);
    response
}

/// Wait for shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::handler::handler_fn;
    use crate::response::ResponseValue;
    use axum::http::{Method, StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn router() -> Router {
        let app = App::new(
            Arc::new(AppConfig::default()),
            handler_fn(|event| {
                Box::pin(async move {
                    let id = event
                        .context
                        .get::<String>(context::REQUEST_ID)
                        .cloned()
                        .unwrap_or_default();
                    Ok(ResponseValue::text(format!("{} {}", event.path(), id)))
                })
            }),
        );
        HttpServer::build_router(app)
    }

    #[tokio::test]
    async fn test_every_path_reaches_the_app() {
        for path in ["/", "/deep/nested/path?q=1"] {
            let request = Request::builder()
                .method(Method::DELETE)
                .uri(path)
                .header("x-request-id", "req-1")
                .body(Body::empty())
                .unwrap();
            let response = router().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(response.headers()["x-request-id"], "req-1");

            let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
            assert_eq!(body, format!("{path} req-1").as_bytes());
        }
    }
}
