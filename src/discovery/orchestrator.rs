//! # Discovery Orchestrator
//!
//! Given a discovery request and an xDS type, produce either a `NotModified`
//! marker or a processed document:
//!
//! 1. resolve the template for `(envoy_version, xds_type)`,
//! 2. build the template context from the node-matched source view and the
//!    configured providers,
//! 3. under the `context` strategy, fingerprint the render inputs and
//!    short-circuit when the caller already holds that version,
//! 4. render; under the `content` strategy, fingerprint the rendered bytes
//!    and short-circuit on match,
//! 5. deserialize text output into a document (structured templates skip
//!    this),
//! 6. filter resources to the caller's requested names.

use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Value};
use tracing::error;

use crate::config::CacheStrategy;
use crate::context::ContextProviderRegistry;
use crate::errors::{HeadwaterError, Result};
use crate::sources::SourceAggregator;
use crate::templates::{RenderOutput, TemplateRegistry};

use super::types::{DiscoveryOutcome, DiscoveryRequest, ProcessedTemplate};
use super::version::{version_hash, version_hash_bytes};

pub struct DiscoveryService {
    templates: Arc<TemplateRegistry>,
    aggregator: Arc<SourceAggregator>,
    providers: Arc<ContextProviderRegistry>,
    cache_strategy: CacheStrategy,
}

impl DiscoveryService {
    pub fn new(
        templates: Arc<TemplateRegistry>,
        aggregator: Arc<SourceAggregator>,
        providers: Arc<ContextProviderRegistry>,
        cache_strategy: CacheStrategy,
    ) -> Self {
        Self { templates, aggregator, providers, cache_strategy }
    }

    pub fn templates(&self) -> &TemplateRegistry {
        &self.templates
    }

    /// Serve one discovery request. Auth has already been checked by the
    /// HTTP layer; nothing here assumes a trusted caller beyond that.
    pub async fn response(
        &self,
        request: &DiscoveryRequest,
        xds_type: &str,
    ) -> Result<DiscoveryOutcome> {
        let envoy_version = request.envoy_version();
        let template =
            self.templates.select(&envoy_version, xds_type).ok_or_else(|| {
                HeadwaterError::not_found("template", format!("{}/{}", envoy_version, xds_type))
            })?;

        let matched = self.aggregator.match_node(&request.node);
        let referenced = self.templates.referenced_variables(&template);
        let mut context = self.providers.safe_context(request, &matched, referenced.as_ref());

        let mut version: Option<String> = None;
        if self.cache_strategy == CacheStrategy::Context {
            let started = Instant::now();
            let fingerprint = version_hash(&(
                &context,
                template.checksum,
                request.node.common(),
                &request.resources,
            ))?;
            metrics::histogram!("discovery_version_hash_seconds")
                .record(started.elapsed().as_secs_f64());
            if fingerprint == request.version_info {
                return Ok(DiscoveryOutcome::NotModified { version_info: fingerprint });
            }
            version = Some(fingerprint);
        }

        // Request-scoped keys are available to the template but excluded
        // from the context fingerprint; the resource list and node identity
        // are hashed explicitly above.
        context.insert("discovery_request".to_string(), serde_json::to_value(request)?);
        context.insert(
            "host_header".to_string(),
            json!(request.desired_controlplane.as_deref().unwrap_or("none")),
        );
        context.insert("resource_names".to_string(), json!(request.resources));

        let started = Instant::now();
        let output = self.templates.render(&template, &context)?;
        metrics::histogram!("discovery_render_seconds", "xds_type" => xds_type.to_string())
            .record(started.elapsed().as_secs_f64());

        let document = match output {
            RenderOutput::Text(text) => {
                if self.cache_strategy == CacheStrategy::Content {
                    let fingerprint = version_hash_bytes(text.as_bytes());
                    if fingerprint == request.version_info {
                        return Ok(DiscoveryOutcome::NotModified { version_info: fingerprint });
                    }
                    version = Some(fingerprint);
                }
                deserialize_config(&text)?
            }
            RenderOutput::Document(document) => {
                if self.cache_strategy == CacheStrategy::Content {
                    let fingerprint = version_hash(&document)?;
                    if fingerprint == request.version_info {
                        return Ok(DiscoveryOutcome::NotModified { version_info: fingerprint });
                    }
                    version = Some(fingerprint);
                }
                document
            }
        };

        let version_info = match version {
            Some(fingerprint) => fingerprint,
            // `none` strategy: a fresh value per response, never compared
            // against the caller's.
            None => version_hash(&document)?,
        };

        let resources = filter_resources(document, &request.resources);
        Ok(DiscoveryOutcome::Processed(ProcessedTemplate { version_info, resources }))
    }
}

/// Parse rendered template text as a YAML-compatible document. The parser's
/// diagnostics go to the log; the returned error carries only a generic
/// client-safe description.
fn deserialize_config(text: &str) -> Result<Value> {
    let parsed: serde_yaml::Value = match serde_yaml::from_str(text) {
        Ok(parsed) => parsed,
        Err(e) => {
            let location = e.location();
            error!(
                problem = %e,
                line = location.as_ref().map(|l| l.line()),
                column = location.as_ref().map(|l| l.column()),
                "Rendered template did not parse as a configuration document"
            );
            metrics::counter!("discovery_deserialize_errors_total").increment(1);
            return Err(HeadwaterError::ConfigDeserialize {
                context: "Rendered template output is not valid YAML".to_string(),
                source: e,
            });
        }
    };
    serde_json::to_value(parsed).map_err(|e| {
        HeadwaterError::serialization(e, "Rendered document is not representable as JSON")
    })
}

/// `x.name` if present else `x.cluster_name`.
fn resource_name(resource: &Value) -> Option<&str> {
    resource
        .get("name")
        .and_then(Value::as_str)
        .or_else(|| resource.get("cluster_name").and_then(Value::as_str))
}

/// Keep only resources the caller asked for; an empty request list keeps
/// everything.
fn filter_resources(document: Value, requested: &[String]) -> Vec<Value> {
    let resources = match document {
        Value::Object(mut map) => match map.remove("resources") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };

    if requested.is_empty() {
        return resources;
    }
    resources
        .into_iter()
        .filter(|resource| {
            resource_name(resource).is_some_and(|name| requested.iter().any(|r| r == name))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use crate::config::CacheStrategy;
    use crate::context::ContextProviderRegistry;
    use crate::discovery::types::{DiscoveryRequest, Node};
    use crate::sources::inline::InlineSource;
    use crate::sources::{ModificationPipeline, SourceAggregator};
    use crate::templates::TemplateRegistry;

    use super::*;

    const CLUSTERS_TEMPLATE: &str = r#"resources:
{%- for instance in instances %}
  - name: {{ instance.name }}
    endpoints:
{%- for endpoint in instance.endpoints %}
      - address: {{ endpoint.address }}
        port: {{ endpoint.port }}
{%- endfor %}
{%- endfor %}
"#;

    async fn service(strategy: CacheStrategy, template: &str) -> DiscoveryService {
        let mut templates = TemplateRegistry::empty();
        templates.add_text("default", "clusters", template.to_string()).unwrap();

        let source = InlineSource::from_config(&json!({
            "instances": [{
                "name": "httpbin-proxy",
                "service_clusters": ["T1"],
                "endpoints": [{"address": "httpbin.org", "port": 443}]
            }]
        }))
        .unwrap();
        let aggregator = Arc::new(SourceAggregator::new(
            vec![Box::new(source)],
            ModificationPipeline::default(),
            "cluster",
        ));
        aggregator.refresh().await;

        DiscoveryService::new(
            Arc::new(templates),
            aggregator,
            Arc::new(ContextProviderRegistry::default()),
            strategy,
        )
    }

    fn request(cluster: &str, version_info: &str, resources: &[&str]) -> DiscoveryRequest {
        DiscoveryRequest {
            version_info: version_info.to_string(),
            node: Node { cluster: cluster.to_string(), ..Node::default() },
            resources: resources.iter().map(|s| s.to_string()).collect(),
            ..DiscoveryRequest::default()
        }
    }

    #[tokio::test]
    async fn renders_matched_instances() {
        let service = service(CacheStrategy::Context, CLUSTERS_TEMPLATE).await;
        let outcome = service.response(&request("T1", "0", &[]), "clusters").await.unwrap();
        let DiscoveryOutcome::Processed(processed) = outcome else {
            panic!("expected processed outcome");
        };
        assert_eq!(processed.resources.len(), 1);
        assert_eq!(processed.resources[0]["name"], "httpbin-proxy");
        assert_eq!(processed.resources[0]["endpoints"][0]["port"], 443);
    }

    #[tokio::test]
    async fn context_strategy_short_circuits_on_version_match() {
        let service = service(CacheStrategy::Context, CLUSTERS_TEMPLATE).await;
        let first = service.response(&request("T1", "0", &[]), "clusters").await.unwrap();
        let version = first.version_info().to_string();

        let second = service.response(&request("T1", &version, &[]), "clusters").await.unwrap();
        assert!(matches!(second, DiscoveryOutcome::NotModified { .. }));
        assert_eq!(second.version_info(), version);
    }

    #[tokio::test]
    async fn content_strategy_short_circuits_on_rendered_bytes() {
        let service = service(CacheStrategy::Content, CLUSTERS_TEMPLATE).await;
        let first = service.response(&request("T1", "0", &[]), "clusters").await.unwrap();
        let version = first.version_info().to_string();

        let second = service.response(&request("T1", &version, &[]), "clusters").await.unwrap();
        assert!(matches!(second, DiscoveryOutcome::NotModified { .. }));
    }

    #[tokio::test]
    async fn none_strategy_always_renders() {
        let service = service(CacheStrategy::None, CLUSTERS_TEMPLATE).await;
        let first = service.response(&request("T1", "0", &[]), "clusters").await.unwrap();
        let version = first.version_info().to_string();
        let second = service.response(&request("T1", &version, &[]), "clusters").await.unwrap();
        assert!(matches!(second, DiscoveryOutcome::Processed(_)));
    }

    #[tokio::test]
    async fn unmatched_node_gets_empty_resources() {
        let service = service(CacheStrategy::Context, CLUSTERS_TEMPLATE).await;
        let outcome = service.response(&request("X9", "0", &[]), "clusters").await.unwrap();
        let DiscoveryOutcome::Processed(processed) = outcome else {
            panic!("expected processed outcome");
        };
        assert!(processed.resources.is_empty());
    }

    #[tokio::test]
    async fn malformed_template_output_is_a_deserialize_error() {
        let service = service(
            CacheStrategy::Context,
            "resources:\n    - address: best-cluster\n    ports:\n        - 443\n",
        )
        .await;
        let err = service.response(&request("T1", "0", &[]), "clusters").await.unwrap_err();
        assert!(matches!(err, HeadwaterError::ConfigDeserialize { .. }));
        let description = err.public_description().unwrap();
        assert!(!description.contains("line"), "client detail must stay generic");
    }

    #[test]
    fn filter_keeps_requested_resources_only() {
        let document = json!({"resources": [
            {"name": "A"}, {"name": "B"}, {"cluster_name": "C"}
        ]});
        let kept = filter_resources(document.clone(), &["B".to_string()]);
        assert_eq!(kept, vec![json!({"name": "B"})]);

        let all = filter_resources(document, &[]);
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn filter_resolves_cluster_name_fallback() {
        let document = json!({"resources": [{"cluster_name": "C"}]});
        let kept = filter_resources(document, &["C".to_string()]);
        assert_eq!(kept.len(), 1);
    }
}
