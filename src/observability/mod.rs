//! # Observability Infrastructure
//!
//! Structured logging and metrics for the Headwater control plane.

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
pub use metrics::init_metrics;
