//! h3-core demo server
//!
//! Serves a handful of routes through the full pipeline:
//!
//! ```text
//! GET  /            plain text
//! GET  /json?name=  JSON built from the query string
//! POST /echo        JSON body echoed back
//! GET  /events      SSE ticker (?count=N, ?interval_ms=N)
//! GET  /error       a handler failure rendered through the error model
//! *                 404 naming method and path
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderValue, Method};
use clap::Parser;
use futures_util::future::BoxFuture;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use h3_core::app::error_hook;
use h3_core::config::{load_config, AppConfig};
use h3_core::handler::{response_hook, HandlerResult};
use h3_core::observability::init_logging;
use h3_core::{
    define_event_handler, App, Event, EventHandler, EventStream, EventStreamMessage, HttpServer,
    ResponseValue,
};

#[derive(Debug, Parser)]
#[command(name = "h3-core", version, about = "Demo server for the h3-core request pipeline")]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Force debug mode (stack traces, pretty JSON).
    #[arg(long)]
    debug: bool,

    /// Override the listener bind address.
    #[arg(short, long)]
    bind: Option<String>,
}

struct DemoRoutes {
    config: Arc<AppConfig>,
}

impl EventHandler for DemoRoutes {
    fn handle<'a>(&'a self, event: &'a mut Event) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            // HEAD uses the GET routes; serialization drops the body.
            let method = match event.method() {
                &Method::HEAD => Method::GET,
                other => other.clone(),
            };
            let path = event.pathname().to_string();

            let result: HandlerResult = match (&method, path.as_str()) {
                (&Method::GET, "/") => Ok(ResponseValue::text("h3-core demo\n")),
                (&Method::GET, "/json") => {
                    let name = event.query().get("name").unwrap_or("world").to_string();
                    Ok(ResponseValue::Json(json!({ "hello": name })))
                }
                (&Method::POST, "/echo") => {
                    let body: Value = event.read_json(self.config.body.max_size).await?;
                    Ok(ResponseValue::Json(json!({ "echo": body })))
                }
                (&Method::GET, "/events") => Ok(ticker(event, &self.config)),
                (&Method::GET, "/error") => Err("demo failure".into()),
                _ => Ok(ResponseValue::NotFound),
            };
            result
        })
    }
}

fn ticker(event: &mut Event, config: &AppConfig) -> ResponseValue {
    let count: u64 = event
        .query()
        .get("count")
        .and_then(|v| v.parse().ok())
        .unwrap_or(5);
    let interval = Duration::from_millis(
        event
            .query()
            .get("interval_ms")
            .and_then(|v| v.parse().ok())
            .unwrap_or(1000),
    );

    let stream = EventStream::new(&config.sse);
    let reader = stream.send(event);

    tokio::spawn(async move {
        for n in 1..=count {
            if stream.is_closed() {
                break;
            }
            let message = EventStreamMessage::new(n.to_string())
                .with_id(n.to_string())
                .with_event("tick");
            stream.push(message).await;
            tokio::time::sleep(interval).await;
        }
        stream.close();
    });

    reader.into()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };
    if cli.debug {
        config.debug = true;
    }
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    init_logging(&config.observability);
    tracing::info!("h3-core v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        debug = config.debug,
        sse_auto_close = config.sse.auto_close,
        body_max_size = config.body.max_size,
        "Configuration loaded"
    );

    let config = Arc::new(config);
    let routes = define_event_handler(DemoRoutes {
        config: config.clone(),
    })
    .on_before_response(response_hook(|event, _response| {
        Box::pin(async move {
            event
                .response
                .headers
                .insert("x-powered-by", HeaderValue::from_static("h3-core"));
            Ok(())
        })
    }));

    let app = App::new(config.clone(), routes).on_error(error_hook(|error, event| {
        let status = error.status_code();
        Box::pin(async move {
            tracing::debug!(status, path = %event.pathname(), "Request failed");
        })
    }));

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(
        address = %local_addr,
        "Listening for connections"
    );

    HttpServer::new(app).run(listener).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
