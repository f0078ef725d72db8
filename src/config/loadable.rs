//! Addressable configuration values.
//!
//! A [`Loadable`] names a value that lives outside the settings file: a local
//! file, an HTTP URL, or an environment variable, with an optional
//! serialization tag. The compact string form is
//! `scheme[+serialization]://path`, e.g. `file+yaml://templates/clusters.yaml`
//! or `env+json://INSTANCE_OVERRIDES`. A string without a scheme separator is
//! kept as a literal value.

use serde::de::{self, Deserializer};
use serde::Deserialize;

use crate::errors::{HeadwaterError, Result};

/// How the loaded bytes are decoded into a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Serialization {
    Yaml,
    Json,
    /// Raw text, returned as a string value.
    Text,
}

impl Serialization {
    fn parse(tag: &str) -> Result<Self> {
        match tag {
            "yaml" => Ok(Serialization::Yaml),
            "json" => Ok(Serialization::Json),
            "string" => Ok(Serialization::Text),
            other => {
                Err(HeadwaterError::config(format!("Unknown serialization tag '{}'", other)))
            }
        }
    }
}

/// Where the value is loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scheme {
    File,
    Http { tls: bool },
    Env,
    /// No scheme separator present; the path itself is the value.
    Literal,
}

/// An addressable configuration value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Loadable {
    pub scheme: Scheme,
    pub serialization: Serialization,
    pub path: String,
}

impl Loadable {
    /// Parse the compact `scheme[+serialization]://path` form.
    pub fn parse(spec: &str) -> Result<Self> {
        let Some((head, path)) = spec.split_once("://") else {
            return Ok(Loadable {
                scheme: Scheme::Literal,
                serialization: Serialization::Text,
                path: spec.to_string(),
            });
        };

        let (scheme_tag, serialization) = match head.split_once('+') {
            Some((scheme, tag)) => (scheme, Serialization::parse(tag)?),
            None => (head, Serialization::Yaml),
        };

        let scheme = match scheme_tag {
            "file" => Scheme::File,
            "http" => Scheme::Http { tls: false },
            "https" => Scheme::Http { tls: true },
            "env" => Scheme::Env,
            other => {
                return Err(HeadwaterError::config(format!(
                    "Unknown loadable scheme '{}' in '{}'",
                    other, spec
                )))
            }
        };

        Ok(Loadable { scheme, serialization, path: path.to_string() })
    }

    /// Load the raw text behind this loadable, ignoring the serialization tag.
    pub async fn load_string(&self) -> Result<String> {
        match &self.scheme {
            Scheme::Literal => Ok(self.path.clone()),
            Scheme::File => {
                tokio::fs::read_to_string(&self.path).await.map_err(|e| HeadwaterError::Io {
                    source: e,
                    context: format!("Failed to read loadable file '{}'", self.path),
                })
            }
            Scheme::Env => std::env::var(&self.path).map_err(|_| {
                HeadwaterError::config(format!("Environment variable '{}' is not set", self.path))
            }),
            Scheme::Http { tls } => {
                let url =
                    format!("{}://{}", if *tls { "https" } else { "http" }, self.path);
                let response = reqwest::get(&url).await?.error_for_status()?;
                Ok(response.text().await?)
            }
        }
    }

    /// Load and decode this loadable into a document.
    pub async fn load(&self) -> Result<serde_json::Value> {
        let text = self.load_string().await?;
        match self.serialization {
            Serialization::Text => Ok(serde_json::Value::String(text)),
            Serialization::Json => serde_json::from_str(&text).map_err(|e| {
                HeadwaterError::serialization(
                    e,
                    format!("Loadable '{}' did not parse as JSON", self.path),
                )
            }),
            Serialization::Yaml => {
                let value: serde_yaml::Value = serde_yaml::from_str(&text).map_err(|e| {
                    HeadwaterError::config_with_source(
                        format!("Loadable '{}' did not parse as YAML", self.path),
                        Box::new(e),
                    )
                })?;
                serde_json::to_value(value).map_err(|e| {
                    HeadwaterError::serialization(
                        e,
                        format!("Loadable '{}' is not representable as JSON", self.path),
                    )
                })
            }
        }
    }
}

impl<'de> Deserialize<'de> for Loadable {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let spec = String::deserialize(deserializer)?;
        Loadable::parse(&spec).map_err(de::Error::custom)
    }
}
