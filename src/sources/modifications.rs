//! Named instance transforms applied while the aggregate is rebuilt.
//!
//! Operators list transform names in `modifications`; each configured name
//! must be registered here before the aggregator is built. A transform can
//! rewrite an instance or drop it (`Ok(None)`); a transform error drops the
//! instance and is recorded, but never aborts the refresh.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use crate::errors::{HeadwaterError, Result};

use super::Instance;

/// One transform stage: `instance → instance | drop`.
pub trait InstanceModifier: Send + Sync {
    fn name(&self) -> &str;

    fn apply(&self, instance: Instance) -> Result<Option<Instance>>;
}

/// Drops instances that resolve to no resource name; such records can never
/// be served and would otherwise survive filtering as unnameable entries.
struct DiscardUnnamed;

impl InstanceModifier for DiscardUnnamed {
    fn name(&self) -> &str {
        "discard_unnamed"
    }

    fn apply(&self, instance: Instance) -> Result<Option<Instance>> {
        if instance.resource_name().is_none() {
            return Ok(None);
        }
        Ok(Some(instance))
    }
}

/// Registry of transforms keyed by name.
pub struct ModificationRegistry {
    by_name: HashMap<String, Arc<dyn InstanceModifier>>,
}

impl ModificationRegistry {
    pub fn with_defaults() -> Self {
        let mut registry = Self { by_name: HashMap::new() };
        registry.register(Arc::new(DiscardUnnamed));
        registry
    }

    pub fn register(&mut self, modifier: Arc<dyn InstanceModifier>) {
        self.by_name.insert(modifier.name().to_string(), modifier);
    }

    /// Resolve the configured names, in order, into a pipeline.
    pub fn pipeline(&self, names: &[String]) -> Result<ModificationPipeline> {
        let stages = names
            .iter()
            .map(|name| {
                self.by_name.get(name).cloned().ok_or_else(|| {
                    HeadwaterError::config(format!("Unknown modification '{}'", name))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(ModificationPipeline { stages })
    }
}

/// The ordered transform chain the aggregator runs each instance through.
#[derive(Clone, Default)]
pub struct ModificationPipeline {
    stages: Vec<Arc<dyn InstanceModifier>>,
}

impl ModificationPipeline {
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run one instance through every stage. Returns `None` when a stage
    /// dropped the instance or failed on it.
    pub fn apply(&self, instance: Instance) -> Option<Instance> {
        let mut current = instance;
        for stage in &self.stages {
            match stage.apply(current) {
                Ok(Some(next)) => current = next,
                Ok(None) => return None,
                Err(e) => {
                    warn!(
                        modification = stage.name(),
                        error = %e,
                        "Instance transform failed, dropping instance"
                    );
                    metrics::counter!("modification_errors_total", "modification" => stage.name().to_string())
                        .increment(1);
                    return None;
                }
            }
        }
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct UppercaseNames;

    impl InstanceModifier for UppercaseNames {
        fn name(&self) -> &str {
            "uppercase_names"
        }

        fn apply(&self, mut instance: Instance) -> Result<Option<Instance>> {
            instance.name = instance.name.map(|n| n.to_uppercase());
            Ok(Some(instance))
        }
    }

    struct AlwaysFails;

    impl InstanceModifier for AlwaysFails {
        fn name(&self) -> &str {
            "always_fails"
        }

        fn apply(&self, _instance: Instance) -> Result<Option<Instance>> {
            Err(HeadwaterError::internal("boom"))
        }
    }

    fn named(name: &str) -> Instance {
        Instance {
            name: Some(name.to_string()),
            cluster_name: None,
            service_clusters: vec!["*".to_string()],
            extra: serde_json::Map::new(),
        }
    }

    #[test]
    fn stages_run_in_configured_order() {
        let mut registry = ModificationRegistry::with_defaults();
        registry.register(Arc::new(UppercaseNames));
        let pipeline = registry
            .pipeline(&["discard_unnamed".to_string(), "uppercase_names".to_string()])
            .unwrap();

        let result = pipeline.apply(named("web")).unwrap();
        assert_eq!(result.name.as_deref(), Some("WEB"));
    }

    #[test]
    fn discard_unnamed_drops_instances_without_names() {
        let registry = ModificationRegistry::with_defaults();
        let pipeline = registry.pipeline(&["discard_unnamed".to_string()]).unwrap();

        let mut unnamed = named("x");
        unnamed.name = None;
        assert!(pipeline.apply(unnamed).is_none());
        assert!(pipeline.apply(named("web")).is_some());
    }

    #[test]
    fn failing_stage_drops_only_that_instance() {
        let mut registry = ModificationRegistry::with_defaults();
        registry.register(Arc::new(AlwaysFails));
        let pipeline = registry.pipeline(&["always_fails".to_string()]).unwrap();
        assert!(pipeline.apply(named("web")).is_none());
    }

    #[test]
    fn unknown_name_is_a_config_error() {
        let registry = ModificationRegistry::with_defaults();
        assert!(registry.pipeline(&["missing".to_string()]).is_err());
    }
}
