//! Tracing setup for binaries and tests embedding the engine

use ocs_core::error::RatingError;
use ocs_core::RatingResult;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn env_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// Install a human-readable subscriber filtered by `RUST_LOG`, falling back
/// to `default_directive` (for example `ocs_engine=debug`)
pub fn init_tracing(default_directive: &str) -> RatingResult<()> {
    tracing_subscriber::registry()
        .with(env_filter(default_directive))
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true),
        )
        .try_init()
        .map_err(|e| RatingError::Config(format!("Failed to install tracing subscriber: {}", e)))
}

/// Install a JSON subscriber for log shipping
pub fn init_json_tracing(default_directive: &str) -> RatingResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_directive))
        .json()
        .try_init()
        .map_err(|e| RatingError::Config(format!("Failed to install tracing subscriber: {}", e)))
}
