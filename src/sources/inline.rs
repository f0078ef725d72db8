//! Inline source: instance records written directly into the settings file.

use async_trait::async_trait;

use crate::errors::{HeadwaterError, Result};

use super::{Instance, InstanceSource};

pub struct InlineSource {
    instances: Vec<Instance>,
}

impl InlineSource {
    /// Config shape: `{instances: [...]}`. The key is required even when the
    /// list is empty so a typo'd config fails loudly at startup.
    pub fn from_config(config: &serde_json::Value) -> Result<Self> {
        let instances = config
            .get("instances")
            .ok_or_else(|| HeadwaterError::config("Inline source config requires 'instances'"))?;
        let instances = serde_json::from_value(instances.clone()).map_err(|e| {
            HeadwaterError::serialization(e, "Inline source 'instances' is not an instance list")
        })?;
        Ok(Self { instances })
    }
}

#[async_trait]
impl InstanceSource for InlineSource {
    fn name(&self) -> &str {
        "inline"
    }

    async fn fetch(&self) -> Result<Vec<Instance>> {
        Ok(self.instances.clone())
    }
}
