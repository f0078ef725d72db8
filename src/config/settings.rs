//! # Configuration Settings
//!
//! Defines the configuration structure for the Headwater control plane.
//! Settings are deserialized from a single YAML document; a handful of
//! server-level fields can be overridden from the environment.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;
use validator::Validate;

use crate::config::Loadable;
use crate::errors::{HeadwaterError, Result};

/// Environment variable overriding the HTTP bind host
const ENV_HOST: &str = "HEADWATER_HOST";

/// Environment variable overriding the HTTP bind port
const ENV_PORT: &str = "HEADWATER_PORT";

/// Which inputs the discovery version fingerprint is computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheStrategy {
    /// Fingerprint the render inputs; skip rendering on a match.
    #[default]
    Context,
    /// Fingerprint the rendered bytes; render always happens.
    Content,
    /// Never short-circuit; a fresh version is computed per response.
    None,
}

/// One configured source: a registered variant name plus its opaque config.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    #[serde(rename = "type")]
    pub source_type: String,
    #[serde(default)]
    pub config: serde_json::Value,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct ServerSettings {
    #[validate(length(min = 1, message = "Host cannot be empty"))]
    pub host: String,

    #[validate(range(min = 1, message = "Port must be between 1 and 65535"))]
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { host: "127.0.0.1".to_string(), port: 8080 }
    }
}

impl ServerSettings {
    /// Get the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Logging and metrics configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObservabilitySettings {
    /// Default tracing filter when `RUST_LOG` is unset
    pub log_level: String,

    /// Emit logs as JSON lines instead of the human-readable format
    pub json_logs: bool,

    /// Expose a Prometheus scrape endpoint
    pub metrics_enabled: bool,

    /// Port for the Prometheus scrape endpoint
    pub metrics_port: u16,
}

impl Default for ObservabilitySettings {
    fn default() -> Self {
        Self {
            log_level: "headwater=info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_port: 9090,
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Validate, Default)]
#[serde(default)]
pub struct Settings {
    #[validate(nested)]
    pub server: ServerSettings,

    pub observability: ObservabilitySettings,

    /// Discovery response caching strategy
    pub cache_strategy: CacheStrategy,

    /// Ordered list of instance sources
    pub sources: Vec<SourceConfig>,

    /// Node field matched against instance `service_clusters`
    pub source_match_key: String,

    /// Ordered list of named instance transforms applied during refresh
    pub modifications: Vec<String>,

    /// Templates keyed by envoy version group, then xDS type. The `default`
    /// group is mandatory.
    pub templates: BTreeMap<String, BTreeMap<String, Loadable>>,

    /// Named context providers loaded at startup
    pub context: BTreeMap<String, Loadable>,

    /// Whether discovery requests must carry a valid auth token
    pub auth_enabled: bool,

    /// Ordered Fernet keys; the first key that verifies a token wins
    pub encryption_keys: Vec<String>,

    /// Node metadata key holding the auth token
    pub auth_payload_key: String,

    /// Predicates over the decrypted token claims: each named field must be
    /// present, and when the value list is non-empty its value must be listed.
    pub auth_required_claims: BTreeMap<String, Vec<String>>,

    /// Maximum accepted token age; unset disables the age check
    pub auth_token_ttl_seconds: Option<u64>,

    /// Source refresh period
    #[validate(range(min = 1, message = "Refresh rate must be at least 1 second"))]
    pub refresh_rate_seconds: u64,

    /// Status code for the NotModified outcome (historically 304)
    #[validate(range(min = 100, max = 599, message = "Invalid status code"))]
    pub no_changes_response_code: u16,
}

impl Settings {
    /// Deserialize settings from a YAML document and validate them.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let mut settings: Settings = serde_yaml::from_str(text)
            .map_err(|e| HeadwaterError::config_with_source("Invalid settings", Box::new(e)))?;
        settings.apply_defaults();
        settings.apply_env_overrides()?;
        settings.validate_all()?;
        Ok(settings)
    }

    /// Load settings from a YAML file on disk.
    pub fn from_yaml_file(path: &str) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| HeadwaterError::Io {
            source: e,
            context: format!("Failed to read settings file '{}'", path),
        })?;
        Self::from_yaml(&text)
    }

    fn apply_defaults(&mut self) {
        if self.source_match_key.is_empty() {
            self.source_match_key = "cluster".to_string();
        }
        if self.auth_payload_key.is_empty() {
            self.auth_payload_key = "auth".to_string();
        }
        if self.refresh_rate_seconds == 0 {
            self.refresh_rate_seconds = 30;
        }
        if self.no_changes_response_code == 0 {
            self.no_changes_response_code = 304;
        }
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(host) = std::env::var(ENV_HOST) {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var(ENV_PORT) {
            self.server.port = port
                .parse()
                .map_err(|_| HeadwaterError::config(format!("Invalid {} '{}'", ENV_PORT, port)))?;
        }
        Ok(())
    }

    /// Validate the entire configuration
    pub fn validate_all(&self) -> Result<()> {
        Validate::validate(self).map_err(HeadwaterError::from)?;
        self.validate_custom()
    }

    /// Custom validation logic that goes beyond what the validator crate can do
    fn validate_custom(&self) -> Result<()> {
        if !self.templates.is_empty() && !self.templates.contains_key("default") {
            return Err(HeadwaterError::config(
                "Template configuration must contain a 'default' version group",
            ));
        }
        if self.auth_enabled && self.encryption_keys.is_empty() {
            return Err(HeadwaterError::config(
                "auth_enabled requires at least one encryption key",
            ));
        }
        Ok(())
    }

    /// Get the source refresh period as a Duration
    pub fn refresh_rate(&self) -> Duration {
        Duration::from_secs(self.refresh_rate_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_applied() {
        let settings = Settings::from_yaml("{}").unwrap();
        assert_eq!(settings.cache_strategy, CacheStrategy::Context);
        assert_eq!(settings.source_match_key, "cluster");
        assert_eq!(settings.auth_payload_key, "auth");
        assert_eq!(settings.refresh_rate_seconds, 30);
        assert_eq!(settings.no_changes_response_code, 304);
        assert!(!settings.auth_enabled);
    }

    #[test]
    fn parses_full_document() {
        let settings = Settings::from_yaml(
            r#"
            cache_strategy: content
            no_changes_response_code: 200
            refresh_rate_seconds: 5
            sources:
              - type: inline
                config:
                  instances:
                    - name: httpbin-proxy
                      service_clusters: [T1]
            templates:
              default:
                clusters: file://templates/clusters.yaml
              "1.16":
                clusters: file://templates/clusters-116.yaml
            "#,
        )
        .unwrap();
        assert_eq!(settings.cache_strategy, CacheStrategy::Content);
        assert_eq!(settings.no_changes_response_code, 200);
        assert_eq!(settings.sources.len(), 1);
        assert_eq!(settings.sources[0].source_type, "inline");
        assert_eq!(settings.templates.len(), 2);
    }

    #[test]
    fn rejects_templates_without_default_group() {
        let result = Settings::from_yaml(
            r#"
            templates:
              "1.16":
                clusters: file://templates/clusters.yaml
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn rejects_auth_without_keys() {
        let result = Settings::from_yaml("auth_enabled: true");
        assert!(result.is_err());
    }
}
