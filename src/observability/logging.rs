//! Structured logging initialization.

use tracing_subscriber::EnvFilter;

use crate::config::ObservabilitySettings;

/// Install the global tracing subscriber. `RUST_LOG` wins over the
/// configured default filter. Call once from `main`; tests run with the
/// subscriber-free default.
pub fn init_logging(settings: &ObservabilitySettings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.log_level.clone()));

    if settings.json_logs {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
