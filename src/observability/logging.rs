//! Structured logging.
//!
//! # Design Decisions
//! - `RUST_LOG` takes precedence over the configured level
//! - JSON output for production, pretty output for development
//! - Initialization is idempotent; a second call leaves the first subscriber in place

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, ObservabilityConfig};

/// Filter from `RUST_LOG`, falling back to `level` for this crate and the HTTP layer.
pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{level},tower_http={level},sqlx=warn")))
}

pub fn init_logging(config: &ObservabilityConfig) {
    let registry = tracing_subscriber::registry().with(env_filter(&config.log_level));

    let result = match config.log_format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(true).with_target(true))
            .try_init(),
        LogFormat::Pretty => registry.with(fmt::layer().with_target(true)).try_init(),
    };

    if result.is_err() {
        tracing::debug!("Global tracing subscriber already initialized");
    }
}
