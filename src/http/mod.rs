//! HTTP transport subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, TraceLayer, request ID)
//!     → adapter.rs (axum Request → IncomingRequest → Event)
//!     → App::dispatch (hooks, handler, serialization)
//!     → adapter.rs (PreparedResponse → axum Response)
//!     → Send to client
//! ```

pub mod adapter;
pub mod server;

pub use adapter::X_REQUEST_ID;
pub use server::HttpServer;
