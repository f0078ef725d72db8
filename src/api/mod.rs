//! # HTTP Surface
//!
//! The axum router, the discovery endpoint, per-request context middleware,
//! and API error mapping.

pub mod discovery_handlers;
pub mod error;
pub mod request_context;
pub mod routes;
pub mod server;

pub use error::ApiError;
pub use request_context::{RequestId, XdsLogFields};
pub use routes::build_router;
pub use server::start_api_server;
