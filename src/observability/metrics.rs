//! Metrics exporter setup.
//!
//! Counters and histograms are recorded through the `metrics` facade at the
//! call sites that own them; this module only installs the optional
//! Prometheus scrape endpoint. With no recorder installed the facade is a
//! no-op, so tests need no setup.

use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;

use crate::config::ObservabilitySettings;
use crate::errors::{HeadwaterError, Result};

pub fn init_metrics(settings: &ObservabilitySettings) -> Result<()> {
    if !settings.metrics_enabled {
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], settings.metrics_port))
        .install()
        .map_err(|e| {
            HeadwaterError::config_with_source("Failed to install metrics exporter", Box::new(e))
        })?;

    info!(port = settings.metrics_port, "Prometheus metrics exporter listening");
    Ok(())
}
