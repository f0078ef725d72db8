//! # Instance Sources
//!
//! Sources provide the backend inventory that templates render against. Each
//! source is a named provider of [`Instance`] records; the
//! [`SourceAggregator`](aggregator::SourceAggregator) pulls every configured
//! source on a schedule and exposes the combined, node-matched view to the
//! discovery pipeline.

pub mod aggregator;
pub mod file;
pub mod inline;
pub mod modifications;
pub mod service_broker;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::SourceConfig;
use crate::errors::{HeadwaterError, Result};

pub use aggregator::SourceAggregator;
pub use modifications::{InstanceModifier, ModificationPipeline, ModificationRegistry};

/// One backend instance record. `name`/`cluster_name` identify the resource
/// the instance contributes to; `service_clusters` scopes it to requesting
/// Envoy nodes. Everything else (domains, endpoints, operator extensions)
/// rides along untyped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_name: Option<String>,

    /// Cluster-name globs this instance is served to; `*` matches any node.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub service_clusters: Vec<String>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Instance {
    /// `name` if present, else `cluster_name`.
    pub fn resource_name(&self) -> Option<&str> {
        self.name.as_deref().or(self.cluster_name.as_deref())
    }

    /// Whether this instance is served to a node in `cluster`. `*` on either
    /// side matches; an instance without service clusters matches nothing.
    pub fn matches_cluster(&self, cluster: &str) -> bool {
        self.service_clusters.iter().any(|sc| sc == "*" || cluster == "*" || sc == cluster)
    }
}

/// Capability set every source variant implements.
#[async_trait]
pub trait InstanceSource: Send + Sync {
    /// The configured variant name, used in logs and refresh error counters.
    fn name(&self) -> &str;

    /// Produce the current instance list. A failure here is isolated by the
    /// aggregator: the source's previous contribution is retained.
    async fn fetch(&self) -> Result<Vec<Instance>>;
}

type SourceConstructor =
    Box<dyn Fn(&serde_json::Value) -> Result<Box<dyn InstanceSource>> + Send + Sync>;

/// Registry of source variants keyed by the `type` field of a source config.
/// `inline`, `file`, and `service_broker` are built in; operators can register
/// additional variants before the aggregator is built.
pub struct SourceRegistry {
    constructors: HashMap<String, SourceConstructor>,
}

impl SourceRegistry {
    pub fn with_defaults() -> Self {
        let mut registry = Self { constructors: HashMap::new() };
        registry.register("inline", |config| {
            Ok(Box::new(inline::InlineSource::from_config(config)?) as Box<dyn InstanceSource>)
        });
        registry.register("file", |config| {
            Ok(Box::new(file::FileSource::from_config(config)?) as Box<dyn InstanceSource>)
        });
        registry.register("service_broker", |config| {
            Ok(Box::new(service_broker::ServiceBrokerSource::from_config(config)?)
                as Box<dyn InstanceSource>)
        });
        registry
    }

    pub fn register<F>(&mut self, source_type: &str, constructor: F)
    where
        F: Fn(&serde_json::Value) -> Result<Box<dyn InstanceSource>> + Send + Sync + 'static,
    {
        self.constructors.insert(source_type.to_string(), Box::new(constructor));
    }

    /// Instantiate one configured source.
    pub fn build(&self, config: &SourceConfig) -> Result<Box<dyn InstanceSource>> {
        let constructor = self.constructors.get(&config.source_type).ok_or_else(|| {
            HeadwaterError::config(format!("Unknown source type '{}'", config.source_type))
        })?;
        constructor(&config.config)
    }

    /// Instantiate every configured source, in declaration order.
    pub fn build_all(&self, configs: &[SourceConfig]) -> Result<Vec<Box<dyn InstanceSource>>> {
        configs.iter().map(|config| self.build(config)).collect()
    }
}

/// Decode a source payload: either a bare array of instances or an object
/// with an `instances` array (the inline source's config shape).
pub(crate) fn instances_from_value(value: &serde_json::Value) -> Result<Vec<Instance>> {
    let list = match value {
        serde_json::Value::Array(_) => value.clone(),
        serde_json::Value::Object(map) => map
            .get("instances")
            .cloned()
            .ok_or_else(|| HeadwaterError::config("Source payload is missing 'instances'"))?,
        _ => return Err(HeadwaterError::config("Source payload must be a list or mapping")),
    };
    serde_json::from_value(list)
        .map_err(|e| HeadwaterError::serialization(e, "Source payload is not an instance list"))
}
