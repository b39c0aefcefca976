//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files, and
//! every field has a default so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};

/// Root configuration for an application.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Include stack traces in error bodies and pretty-print JSON.
    pub debug: bool,

    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Server-sent event stream settings.
    pub sse: SseConfig,

    /// Request body limits.
    pub body: BodyConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "127.0.0.1:3000").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:3000".to_string(),
        }
    }
}

/// Server-sent event stream settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SseConfig {
    /// Close the stream when the client disconnects.
    pub auto_close: bool,

    /// Chunks buffered between a stream and the transport before pushes wait.
    pub channel_capacity: usize,
}

impl Default for SseConfig {
    fn default() -> Self {
        Self {
            auto_close: true,
            channel_capacity: 64,
        }
    }
}

/// Request body settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BodyConfig {
    /// Largest request body, in bytes, that `Event::read_body` accepts.
    pub max_size: usize,
}

impl Default for BodyConfig {
    fn default() -> Self {
        Self {
            max_size: 1024 * 1024,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub json: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
        }
    }
}
