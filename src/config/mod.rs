//! # Configuration Management
//!
//! Settings structures and addressable configuration values for the
//! Headwater control plane.

mod loadable;
mod settings;

pub use loadable::{Loadable, Scheme, Serialization};
pub use settings::{CacheStrategy, ObservabilitySettings, ServerSettings, Settings, SourceConfig};
