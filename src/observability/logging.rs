//! Structured logging setup.
//!
//! # Responsibilities
//! - Install the global tracing subscriber once at startup
//! - Honour `RUST_LOG`, falling back to the configured level
//! - Switch between human-readable and JSON output
//!
//! # Design Decisions
//! - Library code only emits `tracing` events; installing a subscriber is the
//!   binary's job
//! - A second initialisation is reported, not fatal

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;

/// Filter directives used when `RUST_LOG` is unset.
pub fn default_directives(config: &ObservabilityConfig) -> String {
    let level = config.log_level.to_ascii_lowercase();
    format!("h3_core={level},tower_http={level}")
}

/// Install the global subscriber. Returns `false` if one was already set.
pub fn init_logging(config: &ObservabilityConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(config)));

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    match result {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Tracing subscriber already installed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_use_configured_level() {
        let config = ObservabilityConfig {
            log_level: "WARN".to_string(),
            json: false,
        };
        assert_eq!(default_directives(&config), "h3_core=warn,tower_http=warn");
    }
}
