//! # Source Aggregator
//!
//! Maintains the process-wide aggregate of instance records drawn from all
//! configured sources. Readers get an `Arc` snapshot of the whole view;
//! refresh builds the next view off to the side and publishes it with a
//! single pointer swap, so a request sees either the old or the new aggregate
//! and never a mix.
//!
//! Failure semantics: a source whose fetch fails keeps its previous
//! contribution (per-source last-known-good); a source that has never
//! succeeded contributes nothing and is retried on the next tick.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::discovery::types::Node;

use super::{Instance, InstanceSource, ModificationPipeline};

pub struct SourceAggregator {
    sources: Vec<Box<dyn InstanceSource>>,
    pipeline: ModificationPipeline,
    match_key: String,
    snapshot: RwLock<Arc<Vec<Instance>>>,
    /// Last successful fetch per source, in declaration order. Also serves
    /// as the refresh guard: `try_lock` failing means a refresh is running
    /// and the tick is skipped.
    contributions: tokio::sync::Mutex<Vec<Option<Vec<Instance>>>>,
}

impl SourceAggregator {
    pub fn new(
        sources: Vec<Box<dyn InstanceSource>>,
        pipeline: ModificationPipeline,
        match_key: impl Into<String>,
    ) -> Self {
        let slots = sources.len();
        Self {
            sources,
            pipeline,
            match_key: match_key.into(),
            snapshot: RwLock::new(Arc::new(Vec::new())),
            contributions: tokio::sync::Mutex::new(vec![None; slots]),
        }
    }

    /// Pull every source and publish a new aggregate. Per-source failures are
    /// logged and leave that source's previous contribution in place; this
    /// never fails and never publishes a half-built view.
    pub async fn refresh(&self) {
        let Ok(mut contributions) = self.contributions.try_lock() else {
            debug!("Source refresh already in progress, skipping tick");
            return;
        };

        for (slot, source) in self.sources.iter().enumerate() {
            match source.fetch().await {
                Ok(instances) => {
                    let kept: Vec<Instance> = if self.pipeline.is_empty() {
                        instances
                    } else {
                        instances
                            .into_iter()
                            .filter_map(|instance| self.pipeline.apply(instance))
                            .collect()
                    };
                    debug!(source = source.name(), count = kept.len(), "Source refreshed");
                    contributions[slot] = Some(kept);
                }
                Err(e) => {
                    warn!(
                        source = source.name(),
                        error = %e,
                        "Source refresh failed, keeping previous contribution"
                    );
                    metrics::counter!("source_refresh_errors_total", "source" => source.name().to_string())
                        .increment(1);
                }
            }
        }

        let aggregate: Vec<Instance> =
            contributions.iter().flatten().flat_map(|batch| batch.iter().cloned()).collect();

        let aggregate = Arc::new(aggregate);
        metrics::gauge!("aggregated_instances").set(aggregate.len() as f64);
        *self.snapshot.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = aggregate;
    }

    /// The full aggregate as of the last completed refresh.
    pub fn all(&self) -> Arc<Vec<Instance>> {
        self.snapshot.read().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }

    /// Instances served to this node: those whose `service_clusters`
    /// intersect the node's match value under glob rules. Ordering is source
    /// declaration order, then input order within a source. Computed per
    /// request, never cached.
    pub fn match_node(&self, node: &Node) -> Vec<Instance> {
        let value = node.match_value(&self.match_key).unwrap_or_default();
        self.all().iter().filter(|instance| instance.matches_cluster(&value)).cloned().collect()
    }

    /// Drive periodic refresh. The interval skips ticks that land while a
    /// refresh is still running, so executions never overlap or pile up.
    pub fn spawn_refresh_task(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let aggregator = Arc::clone(self);
        info!(period_seconds = period.as_secs(), "Starting source refresh task");
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick fires immediately; the aggregate was already
            // warmed synchronously at startup.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                aggregator.refresh().await;
            }
        })
    }
}
