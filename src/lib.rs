//! # Headwater
//!
//! Headwater is an HTTP xDS control plane: Envoy proxies POST Discovery
//! requests and receive configuration (clusters, listeners, routes,
//! endpoints, secrets, scoped-routes) rendered from operator-authored
//! templates against dynamically refreshed backend inventories.
//!
//! ## Architecture
//!
//! ```text
//! Envoy → HTTP API → Discovery Orchestrator → Template Registry
//!             ↓               ↓                      ↓
//!           Auth       Source Aggregator      Context Providers
//! ```
//!
//! ## Core Components
//!
//! - **Source Aggregator**: pulls instance records from configured sources
//!   on a schedule and exposes a node-matched view of the aggregate
//! - **Template Registry**: immutable, version-selected renderables loaded
//!   at startup
//! - **Discovery Orchestrator**: fingerprints, renders, deserializes, and
//!   filters per request, short-circuiting callers that are up to date
//! - **HTTP Surface**: Axum-based discovery endpoint with request-scoped
//!   logging context

pub mod api;
pub mod auth;
pub mod config;
pub mod context;
pub mod discovery;
pub mod errors;
pub mod observability;
pub mod sources;
pub mod startup;
pub mod templates;

// Re-export commonly used types and traits
pub use config::Settings;
pub use errors::{Error, HeadwaterError, Result};
pub use startup::{ControlPlane, Extensions};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
