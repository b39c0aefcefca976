//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events with structured fields (method, path, status, request_id)
//!     → request spans from the transport's TraceLayer
//!
//! logging.rs installs the subscriber:
//!     → EnvFilter (RUST_LOG or configured level)
//!     → fmt layer (plain or JSON lines) on stdout
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Request ID flows through the event context into log fields

pub mod logging;

pub use logging::init_logging;
