//! Structured logging setup for the dispatch station.
//!
//! Centralized tracing initialization with environment-based filtering,
//! in plain or JSON output.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging with human-readable output.
///
/// Log level comes from the `RUST_LOG` environment variable and
/// defaults to `info`.
///
/// # Example
/// ```no_run
/// use lastmile_dispatch::logging;
///
/// logging::init();
/// tracing::info!("Station started");
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .init();
}

/// Initialize logging with JSON output for log aggregation.
///
/// Log level comes from the `RUST_LOG` environment variable and
/// defaults to `info`.
pub fn init_json() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().with_target(true))
        .init();
}
