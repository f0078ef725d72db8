//! Startup sequence for the Headwater control plane.
//!
//! The [`ControlPlane`] aggregate owns everything with process lifetime: the
//! warmed source aggregate, the immutable template registry, the context
//! providers, and the auth validator. It is constructed explicitly at
//! startup (no module-level state), and tests build fresh instances per
//! case.

use std::sync::Arc;

use axum::Router;
use tokio::task::JoinHandle;
use tracing::info;

use crate::api::routes::build_router;
use crate::auth::AuthValidator;
use crate::config::Settings;
use crate::context::ContextProviderRegistry;
use crate::discovery::DiscoveryService;
use crate::sources::{ModificationRegistry, SourceAggregator, SourceRegistry};
use crate::templates::TemplateRegistry;
use crate::Result;

/// Extension points resolved before the control plane is built: operators
/// register custom source variants, instance transforms, dynamic context
/// providers, and structured templates here.
pub struct Extensions {
    pub sources: SourceRegistry,
    pub modifications: ModificationRegistry,
    pub providers: ContextProviderRegistry,
    /// Replaces the settings-driven template registry when set; used to
    /// register structured templates alongside text ones.
    pub templates: Option<TemplateRegistry>,
}

impl Default for Extensions {
    fn default() -> Self {
        Self {
            sources: SourceRegistry::with_defaults(),
            modifications: ModificationRegistry::with_defaults(),
            providers: ContextProviderRegistry::default(),
            templates: None,
        }
    }
}

pub struct ControlPlane {
    pub settings: Settings,
    pub auth: AuthValidator,
    pub aggregator: Arc<SourceAggregator>,
    pub discovery: DiscoveryService,
}

impl ControlPlane {
    pub async fn build(settings: Settings) -> Result<Arc<Self>> {
        Self::build_with(settings, Extensions::default()).await
    }

    /// Build the control plane: construct sources and the modification
    /// pipeline, warm the aggregate synchronously, load templates and
    /// context providers. Everything constructed here is immutable for the
    /// life of the process except the aggregate, which the refresh task
    /// swaps atomically.
    pub async fn build_with(settings: Settings, extensions: Extensions) -> Result<Arc<Self>> {
        settings.validate_all()?;

        let auth = AuthValidator::from_settings(&settings)?;

        let sources = extensions.sources.build_all(&settings.sources)?;
        let pipeline = extensions.modifications.pipeline(&settings.modifications)?;
        let aggregator = Arc::new(SourceAggregator::new(
            sources,
            pipeline,
            settings.source_match_key.clone(),
        ));

        info!(source_count = settings.sources.len(), "Warming sources before startup");
        aggregator.refresh().await;

        let templates = match extensions.templates {
            Some(templates) => templates,
            None => TemplateRegistry::from_settings(&settings.templates).await?,
        };
        info!(
            discovery_types = ?templates.discovery_types(),
            "Template registry loaded"
        );

        let mut providers = ContextProviderRegistry::from_settings(&settings.context).await?;
        providers.merge(extensions.providers);

        let discovery = DiscoveryService::new(
            Arc::new(templates),
            Arc::clone(&aggregator),
            Arc::new(providers),
            settings.cache_strategy,
        );

        Ok(Arc::new(Self { settings, auth, aggregator, discovery }))
    }

    /// Start the periodic source refresh.
    pub fn spawn_refresh_task(self: &Arc<Self>) -> JoinHandle<()> {
        self.aggregator.spawn_refresh_task(self.settings.refresh_rate())
    }

    pub fn router(self: &Arc<Self>) -> Router {
        build_router(Arc::clone(self))
    }

    #[cfg(test)]
    pub(crate) async fn for_tests() -> Arc<Self> {
        Self::build(Settings::from_yaml("{}").expect("empty settings parse"))
            .await
            .expect("test control plane")
    }
}
