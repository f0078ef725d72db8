//! # Context Providers
//!
//! Providers contribute named values to the mapping a template renders
//! against. Operators configure static providers as Loadables in settings;
//! dynamic providers (computed from the matched instance view or the
//! request) are registered in code before startup completes.
//!
//! `safe_context` composes the providers: when the template's referenced
//! keys are cheaply detectable, only those providers run; a provider that
//! fails is logged and its key omitted, never failing the request. The
//! matched instance view is always injected under `instances`.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::warn;

use crate::config::Loadable;
use crate::discovery::types::DiscoveryRequest;
use crate::errors::Result;
use crate::sources::Instance;

/// Key the matched instance view is injected under.
pub const INSTANCES_KEY: &str = "instances";

pub trait ContextProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Produce this provider's value for one request.
    fn value(&self, instances: &[Instance], request: &DiscoveryRequest) -> Result<Value>;
}

/// Provider backed by a value loaded once at startup.
struct StaticValueProvider {
    name: String,
    value: Value,
}

impl ContextProvider for StaticValueProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn value(&self, _instances: &[Instance], _request: &DiscoveryRequest) -> Result<Value> {
        Ok(self.value.clone())
    }
}

#[derive(Default)]
pub struct ContextProviderRegistry {
    providers: Vec<Arc<dyn ContextProvider>>,
}

impl ContextProviderRegistry {
    /// Load the configured static providers, in name order.
    pub async fn from_settings(config: &BTreeMap<String, Loadable>) -> Result<Self> {
        let mut registry = Self::default();
        for (name, loadable) in config {
            let value = loadable.load().await?;
            registry.register(Arc::new(StaticValueProvider { name: name.clone(), value }));
        }
        Ok(registry)
    }

    pub fn register(&mut self, provider: Arc<dyn ContextProvider>) {
        self.providers.push(provider);
    }

    /// Append another registry's providers after this one's.
    pub fn merge(&mut self, other: ContextProviderRegistry) {
        self.providers.extend(other.providers);
    }

    /// Compose the provider values into the template context. `referenced`
    /// of `None` means the template's key usage is unknown and every
    /// provider is evaluated.
    pub fn safe_context(
        &self,
        request: &DiscoveryRequest,
        instances: &[Instance],
        referenced: Option<&HashSet<String>>,
    ) -> Map<String, Value> {
        let mut context = Map::new();

        for provider in &self.providers {
            if let Some(wanted) = referenced {
                if !wanted.contains(provider.name()) {
                    continue;
                }
            }
            match provider.value(instances, request) {
                Ok(value) => {
                    context.insert(provider.name().to_string(), value);
                }
                Err(e) => {
                    warn!(
                        provider = provider.name(),
                        error = %e,
                        "Context provider failed, omitting key"
                    );
                    metrics::counter!("context_provider_errors_total", "provider" => provider.name().to_string())
                        .increment(1);
                }
            }
        }

        context.insert(
            INSTANCES_KEY.to_string(),
            serde_json::to_value(instances).unwrap_or(Value::Array(Vec::new())),
        );
        context
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::HeadwaterError;
    use serde_json::json;

    struct FailingProvider;

    impl ContextProvider for FailingProvider {
        fn name(&self) -> &str {
            "broken"
        }

        fn value(&self, _: &[Instance], _: &DiscoveryRequest) -> Result<Value> {
            Err(HeadwaterError::provider("broken", "boom"))
        }
    }

    struct RegionProvider;

    impl ContextProvider for RegionProvider {
        fn name(&self) -> &str {
            "region"
        }

        fn value(&self, _: &[Instance], _: &DiscoveryRequest) -> Result<Value> {
            Ok(json!("us-west-2"))
        }
    }

    fn request() -> DiscoveryRequest {
        DiscoveryRequest::default()
    }

    #[test]
    fn providers_contribute_named_values() {
        let mut registry = ContextProviderRegistry::default();
        registry.register(Arc::new(RegionProvider));

        let context = registry.safe_context(&request(), &[], None);
        assert_eq!(context.get("region"), Some(&json!("us-west-2")));
        assert!(context.contains_key(INSTANCES_KEY));
    }

    #[test]
    fn failing_provider_is_omitted_not_fatal() {
        let mut registry = ContextProviderRegistry::default();
        registry.register(Arc::new(FailingProvider));
        registry.register(Arc::new(RegionProvider));

        let context = registry.safe_context(&request(), &[], None);
        assert!(!context.contains_key("broken"));
        assert_eq!(context.get("region"), Some(&json!("us-west-2")));
    }

    #[test]
    fn unreferenced_providers_are_skipped() {
        let mut registry = ContextProviderRegistry::default();
        registry.register(Arc::new(RegionProvider));

        let referenced: HashSet<String> = [INSTANCES_KEY.to_string()].into();
        let context = registry.safe_context(&request(), &[], Some(&referenced));
        assert!(!context.contains_key("region"));
        assert!(context.contains_key(INSTANCES_KEY));
    }

    #[tokio::test]
    async fn static_providers_load_from_settings() {
        std::env::set_var("HEADWATER_CONTEXT_TEST", r#"{"eta": "version-7"}"#);
        let config = BTreeMap::from([(
            "utils".to_string(),
            Loadable::parse("env+json://HEADWATER_CONTEXT_TEST").unwrap(),
        )]);
        let registry = ContextProviderRegistry::from_settings(&config).await.unwrap();
        let context = registry.safe_context(&request(), &[], None);
        assert_eq!(context["utils"]["eta"], "version-7");
    }
}
