//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::sync::Arc;

use h3_core::{App, AppConfig, HttpServer};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// A config with debug mode set as requested and everything else defaulted.
#[allow(dead_code)]
pub fn config(debug: bool) -> Arc<AppConfig> {
    Arc::new(AppConfig {
        debug,
        ..AppConfig::default()
    })
}

/// A running test server. Dropping it shuts the server down.
#[allow(dead_code)]
pub struct TestServer {
    pub addr: SocketAddr,
    _shutdown: oneshot::Sender<()>,
}

#[allow(dead_code)]
impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Serve `app` on an ephemeral local port.
#[allow(dead_code)]
pub async fn start_server(app: App) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        let shutdown = async move {
            let _ = rx.await;
        };
        HttpServer::new(app).run_until(listener, shutdown).await.unwrap();
    });

    TestServer {
        addr,
        _shutdown: tx,
    }
}
