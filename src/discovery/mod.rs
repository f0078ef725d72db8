//! # Configuration Discovery
//!
//! The discovery pipeline: wire types, version fingerprints, and the
//! orchestrator that binds sources, context, and templates into a response.

pub mod orchestrator;
pub mod types;
pub mod version;

pub use orchestrator::DiscoveryService;
pub use types::{DiscoveryOutcome, DiscoveryRequest, Node, ProcessedTemplate};
pub use version::{version_hash, version_hash_bytes};
