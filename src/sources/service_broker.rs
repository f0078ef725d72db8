//! Service-broker source: pulls instance records from one or more HTTP
//! endpoints on every refresh. Broker responses are either a JSON array of
//! instances or an object with an `instances` array.

use async_trait::async_trait;
use tracing::debug;

use crate::errors::{HeadwaterError, Result};

use super::{instances_from_value, Instance, InstanceSource};

pub struct ServiceBrokerSource {
    brokers: Vec<String>,
    client: reqwest::Client,
}

impl ServiceBrokerSource {
    /// Config shape: `{brokers: ["https://..."], timeout_seconds: 5}`.
    pub fn from_config(config: &serde_json::Value) -> Result<Self> {
        let brokers: Vec<String> = config
            .get("brokers")
            .cloned()
            .ok_or_else(|| {
                HeadwaterError::config("Service broker source config requires 'brokers'")
            })
            .and_then(|v| {
                serde_json::from_value(v).map_err(|e| {
                    HeadwaterError::serialization(e, "'brokers' is not a list of URLs")
                })
            })?;
        if brokers.is_empty() {
            return Err(HeadwaterError::config("Service broker source needs at least one URL"));
        }

        let timeout = config.get("timeout_seconds").and_then(|v| v.as_u64()).unwrap_or(10);
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout))
            .build()
            .map_err(|e| {
                HeadwaterError::config_with_source("Failed to build broker HTTP client", Box::new(e))
            })?;

        Ok(Self { brokers, client })
    }
}

#[async_trait]
impl InstanceSource for ServiceBrokerSource {
    fn name(&self) -> &str {
        "service_broker"
    }

    /// A failing broker fails the whole fetch; the aggregator keeps this
    /// source's previous contribution in that case.
    async fn fetch(&self) -> Result<Vec<Instance>> {
        let mut instances = Vec::new();
        for broker in &self.brokers {
            let payload: serde_json::Value = self
                .client
                .get(broker)
                .send()
                .await
                .and_then(|response| response.error_for_status())
                .map_err(|e| HeadwaterError::source("service_broker", e.to_string()))?
                .json()
                .await
                .map_err(|e| HeadwaterError::source("service_broker", e.to_string()))?;

            let batch = instances_from_value(&payload)?;
            debug!(broker = %broker, count = batch.len(), "Fetched broker instances");
            instances.extend(batch);
        }
        Ok(instances)
    }
}
