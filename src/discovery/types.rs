//! Discovery wire types and the static xDS type-URL table.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// `version_info` sent by a client that has no prior version. Fingerprints
/// never collide with it by construction (they are 16 hex chars).
pub const INITIAL_VERSION: &str = "0";

/// Envoy client identity carried on every discovery request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Node {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub cluster: String,

    /// Raw build string, e.g. `d8bzz/1.16.2/Clean/RELEASE/BoringSSL`.
    #[serde(default)]
    pub build_version: String,

    /// Free-form client metadata; carries the auth token and optional `ipv4`.
    #[serde(default)]
    pub metadata: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locality: Option<Value>,
}

impl Node {
    /// Envoy release parsed out of `build_version`, or `default` when the
    /// build string does not carry one. Used to select a template group.
    pub fn envoy_version(&self) -> String {
        self.build_version
            .split('/')
            .nth(1)
            .filter(|segment| segment.chars().next().is_some_and(|c| c.is_ascii_digit()))
            .unwrap_or("default")
            .to_string()
    }

    /// The node fields that define configuration identity, excluding volatile
    /// metadata (addresses, auth material). Fingerprinting over this keeps a
    /// client's version stable across reconnects from new addresses.
    pub fn common(&self) -> Value {
        serde_json::json!({
            "cluster": self.cluster,
            "build_version": self.build_version,
            "locality": self.locality,
        })
    }

    /// Resolve the configured `source_match_key` against this node:
    /// `cluster` and `id` are node fields, anything else is a metadata key.
    pub fn match_value(&self, key: &str) -> Option<String> {
        match key {
            "cluster" => Some(self.cluster.clone()),
            "id" => Some(self.id.clone()),
            other => self.metadata.get(other).and_then(|v| v.as_str()).map(str::to_string),
        }
    }

    /// Client address advertised via metadata, `-` when absent.
    pub fn client_ip(&self) -> String {
        self.metadata.get("ipv4").and_then(|v| v.as_str()).unwrap_or("-").to_string()
    }
}

fn initial_version() -> String {
    INITIAL_VERSION.to_string()
}

/// An Envoy Discovery request as received over HTTP.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscoveryRequest {
    #[serde(default = "initial_version")]
    pub version_info: String,

    #[serde(default)]
    pub node: Node,

    /// Requested resource names; empty means "send everything".
    #[serde(default, alias = "resource_names")]
    pub resources: Vec<String>,

    /// Filled in by the server from the api version and xDS type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_url: Option<String>,

    /// Host header echo, recorded for templates and logs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desired_controlplane: Option<String>,
}

impl DiscoveryRequest {
    pub fn envoy_version(&self) -> String {
        self.node.envoy_version()
    }
}

/// A processed discovery response: the filtered resource list plus the
/// version fingerprint the orchestrator computed for it.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedTemplate {
    pub version_info: String,
    pub resources: Vec<Value>,
}

/// Orchestrator outcome. `NotModified` outranks everything else, including
/// the empty-resources 404 path.
#[derive(Debug, Clone)]
pub enum DiscoveryOutcome {
    NotModified { version_info: String },
    Processed(ProcessedTemplate),
}

impl DiscoveryOutcome {
    pub fn version_info(&self) -> &str {
        match self {
            DiscoveryOutcome::NotModified { version_info } => version_info,
            DiscoveryOutcome::Processed(processed) => &processed.version_info,
        }
    }
}

static TYPE_URLS: Lazy<HashMap<(u8, &'static str), &'static str>> = Lazy::new(|| {
    HashMap::from([
        ((2, "listeners"), "type.googleapis.com/envoy.api.v2.Listener"),
        ((2, "clusters"), "type.googleapis.com/envoy.api.v2.Cluster"),
        ((2, "endpoints"), "type.googleapis.com/envoy.api.v2.ClusterLoadAssignment"),
        ((2, "secrets"), "type.googleapis.com/envoy.api.v2.auth.Secret"),
        ((2, "routes"), "type.googleapis.com/envoy.api.v2.RouteConfiguration"),
        ((2, "scoped-routes"), "type.googleapis.com/envoy.api.v2.ScopedRouteConfiguration"),
        ((3, "listeners"), "type.googleapis.com/envoy.config.listener.v3.Listener"),
        ((3, "clusters"), "type.googleapis.com/envoy.config.cluster.v3.Cluster"),
        ((3, "routes"), "type.googleapis.com/envoy.config.route.v3.RouteConfiguration"),
        ((3, "scoped-routes"), "type.googleapis.com/envoy.config.route.v3.ScopedRouteConfiguration"),
    ])
});

/// Resolve the xDS type URL for an api version + type pair. Unknown pairs
/// resolve to `None` and leave `type_url` unset rather than erroring; older
/// api paths rely on that.
pub fn type_url_for(api_version: u8, xds_type: &str) -> Option<&'static str> {
    TYPE_URLS.get(&(api_version, xds_type)).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envoy_version_is_parsed_from_build_string() {
        let node = Node {
            build_version: "d8bzz4f/1.16.2/Clean/RELEASE/BoringSSL".to_string(),
            ..Node::default()
        };
        assert_eq!(node.envoy_version(), "1.16.2");
    }

    #[test]
    fn envoy_version_falls_back_to_default() {
        assert_eq!(Node::default().envoy_version(), "default");
        let node = Node { build_version: "garbage".to_string(), ..Node::default() };
        assert_eq!(node.envoy_version(), "default");
        let node = Node { build_version: "a/b/c".to_string(), ..Node::default() };
        assert_eq!(node.envoy_version(), "default");
    }

    #[test]
    fn common_excludes_metadata() {
        let node = Node {
            cluster: "T1".to_string(),
            metadata: serde_json::from_value(json!({"ipv4": "10.0.0.1"})).unwrap(),
            ..Node::default()
        };
        let common = node.common();
        assert_eq!(common["cluster"], "T1");
        assert!(common.get("metadata").is_none());
    }

    #[test]
    fn request_accepts_envoy_resource_names_alias() {
        let request: DiscoveryRequest = serde_json::from_value(json!({
            "version_info": "0",
            "node": {"cluster": "T1", "build_version": "x/1.13.0/Clean/RELEASE"},
            "resource_names": ["web"]
        }))
        .unwrap();
        assert_eq!(request.resources, vec!["web"]);
        assert_eq!(request.envoy_version(), "1.13.0");
    }

    #[test]
    fn missing_version_info_defaults_to_initial() {
        let request: DiscoveryRequest = serde_json::from_value(json!({"node": {}})).unwrap();
        assert_eq!(request.version_info, INITIAL_VERSION);
    }

    #[test]
    fn type_url_table_covers_v2_and_v3() {
        assert_eq!(
            type_url_for(2, "clusters"),
            Some("type.googleapis.com/envoy.api.v2.Cluster")
        );
        assert_eq!(
            type_url_for(3, "scoped-routes"),
            Some("type.googleapis.com/envoy.config.route.v3.ScopedRouteConfiguration")
        );
        assert_eq!(type_url_for(3, "endpoints"), None);
        assert_eq!(type_url_for(4, "clusters"), None);
    }
}
