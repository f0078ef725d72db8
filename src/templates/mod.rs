//! # Template Registry
//!
//! Templates turn a context mapping into an xDS configuration document. They
//! are held in groups keyed by Envoy version selector; within a group they
//! are keyed by xDS type. A request's Envoy build resolves to the group with
//! the longest matching version prefix, falling back to the mandatory
//! `default` group.
//!
//! Two template flavors exist: `Text` templates are minijinja sources whose
//! render output is parsed as a YAML-compatible document, and `Structured`
//! templates are native renderers that return an already-structured document
//! (no deserialization step). The union of types across all groups is the
//! closed set of valid `xds_type` path parameters, fixed at startup.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use minijinja::Environment;
use serde_json::{Map, Value};
use xxhash_rust::xxh64::xxh64;

use crate::config::Loadable;
use crate::errors::{HeadwaterError, Result};

/// Native renderer for structured templates.
pub type StructuredRenderer = Arc<dyn Fn(&Map<String, Value>) -> Result<Value> + Send + Sync>;

enum TemplateBody {
    /// Rendered through the registry's minijinja environment.
    Text,
    Structured { render: StructuredRenderer },
}

/// An addressable, named renderable with a stable checksum.
pub struct XdsTemplate {
    /// Environment key, `<group>/<xds_type>`.
    name: String,
    pub xds_type: String,
    /// Bytes-level fingerprint of the template source (or renderer
    /// identity for structured templates), captured once at load.
    pub checksum: u64,
    body: TemplateBody,
}

impl XdsTemplate {
    /// Structured templates return a document directly and skip the YAML
    /// deserialization step.
    pub fn is_structured(&self) -> bool {
        matches!(self.body, TemplateBody::Structured { .. })
    }
}

/// What a render produced; the orchestrator branches on this tag.
pub enum RenderOutput {
    Text(String),
    Document(Value),
}

pub struct TemplateRegistry {
    env: Environment<'static>,
    groups: BTreeMap<String, HashMap<String, Arc<XdsTemplate>>>,
    discovery_types: BTreeSet<String>,
}

impl TemplateRegistry {
    pub fn empty() -> Self {
        Self { env: Environment::new(), groups: BTreeMap::new(), discovery_types: BTreeSet::new() }
    }

    /// Load every configured template group. Loadables are fetched once;
    /// templates are immutable afterwards.
    pub async fn from_settings(
        config: &BTreeMap<String, BTreeMap<String, Loadable>>,
    ) -> Result<Self> {
        let mut registry = Self::empty();
        for (group, types) in config {
            for (xds_type, loadable) in types {
                let source = loadable.load_string().await?;
                registry.add_text(group, xds_type, source)?;
            }
        }
        registry.ensure_default_group()?;
        Ok(registry)
    }

    fn ensure_default_group(&self) -> Result<()> {
        if !self.groups.is_empty() && !self.groups.contains_key("default") {
            return Err(HeadwaterError::config(
                "Template configuration must contain a 'default' version group",
            ));
        }
        Ok(())
    }

    /// Register a text template under a version group.
    pub fn add_text(&mut self, group: &str, xds_type: &str, source: String) -> Result<()> {
        let name = format!("{}/{}", group, xds_type);
        let checksum = xxh64(source.as_bytes(), 0);
        self.env.add_template_owned(name.clone(), source).map_err(|e| {
            HeadwaterError::config_with_source(
                format!("Template '{}' failed to compile", name),
                Box::new(e),
            )
        })?;
        self.insert(
            group,
            XdsTemplate {
                name,
                xds_type: xds_type.to_string(),
                checksum,
                body: TemplateBody::Text,
            },
        );
        Ok(())
    }

    /// Register a structured (native) template. `identity` stands in for the
    /// source text when computing the checksum; bump it when the renderer's
    /// output semantics change.
    pub fn add_structured(
        &mut self,
        group: &str,
        xds_type: &str,
        identity: &str,
        render: StructuredRenderer,
    ) {
        let name = format!("{}/{}", group, xds_type);
        let checksum = xxh64(identity.as_bytes(), 0);
        self.insert(
            group,
            XdsTemplate {
                name,
                xds_type: xds_type.to_string(),
                checksum,
                body: TemplateBody::Structured { render },
            },
        );
    }

    fn insert(&mut self, group: &str, template: XdsTemplate) {
        self.discovery_types.insert(template.xds_type.clone());
        self.groups
            .entry(group.to_string())
            .or_default()
            .insert(template.xds_type.clone(), Arc::new(template));
    }

    /// The closed set of xDS types served by this process: the union of
    /// types present across all version groups.
    pub fn discovery_types(&self) -> &BTreeSet<String> {
        &self.discovery_types
    }

    pub fn is_known_type(&self, xds_type: &str) -> bool {
        self.discovery_types.contains(xds_type)
    }

    /// Resolve a template for `(envoy_version, xds_type)`: the non-default
    /// group whose key is the longest prefix of the Envoy version wins; a
    /// type the winning group does not carry falls back to `default`.
    pub fn select(&self, envoy_version: &str, xds_type: &str) -> Option<Arc<XdsTemplate>> {
        let group = self
            .groups
            .keys()
            .filter(|key| key.as_str() != "default" && envoy_version.starts_with(key.as_str()))
            .max_by_key(|key| key.len());

        group
            .and_then(|key| self.groups.get(key))
            .and_then(|types| types.get(xds_type))
            .or_else(|| self.groups.get("default").and_then(|types| types.get(xds_type)))
            .cloned()
    }

    /// Top-level context keys the template references, when cheaply
    /// detectable. `None` means "unknown, evaluate everything".
    pub fn referenced_variables(&self, template: &XdsTemplate) -> Option<HashSet<String>> {
        match template.body {
            TemplateBody::Text => self
                .env
                .get_template(&template.name)
                .ok()
                .map(|compiled| compiled.undeclared_variables(false)),
            TemplateBody::Structured { .. } => None,
        }
    }

    /// Evaluate the template against a context. Rendering is pure with
    /// respect to the context.
    pub fn render(
        &self,
        template: &XdsTemplate,
        context: &Map<String, Value>,
    ) -> Result<RenderOutput> {
        match &template.body {
            TemplateBody::Text => {
                let compiled = self.env.get_template(&template.name).map_err(|e| {
                    HeadwaterError::template_render_with_source(
                        format!("Template '{}' is not loaded", template.name),
                        Box::new(e),
                    )
                })?;
                let text = compiled.render(context).map_err(|e| {
                    HeadwaterError::template_render_with_source(
                        format!("Template '{}' failed to render", template.name),
                        Box::new(e),
                    )
                })?;
                Ok(RenderOutput::Text(text))
            }
            TemplateBody::Structured { render } => {
                Ok(RenderOutput::Document(render(context)?))
            }
        }
    }
}
