//! Logging initialization for binaries and integration tests.
//!
//! Secret material is never logged anywhere in keyfort; this only wires
//! up the subscriber.

use crate::config::TelemetryConfig;

pub fn init_logging(config: &TelemetryConfig) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    if config.log_format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }
}
