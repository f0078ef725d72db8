//! File source: instance records loaded from a [`Loadable`] on every refresh,
//! so edits to the backing file are picked up without a restart.

use async_trait::async_trait;

use crate::config::Loadable;
use crate::errors::{HeadwaterError, Result};

use super::{instances_from_value, Instance, InstanceSource};

pub struct FileSource {
    loadable: Loadable,
}

impl FileSource {
    /// Config shape: `{path: "file://..."}`; any loadable scheme works.
    pub fn from_config(config: &serde_json::Value) -> Result<Self> {
        let path = config
            .get("path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| HeadwaterError::config("File source config requires 'path'"))?;
        Ok(Self { loadable: Loadable::parse(path)? })
    }
}

#[async_trait]
impl InstanceSource for FileSource {
    fn name(&self) -> &str {
        "file"
    }

    async fn fetch(&self) -> Result<Vec<Instance>> {
        let document = self.loadable.load().await?;
        instances_from_value(&document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn rejects_config_without_path() {
        assert!(FileSource::from_config(&json!({"abc": "foo"})).is_err());
    }

    #[tokio::test]
    async fn loads_instances_from_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "instances:\n  - name: httpbin-proxy\n    service_clusters: [T1]\n"
        )
        .unwrap();

        let source = FileSource::from_config(&json!({
            "path": format!("file://{}", file.path().display())
        }))
        .unwrap();

        let instances = source.fetch().await.unwrap();
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].service_clusters, vec!["T1"]);
    }

    #[tokio::test]
    async fn missing_file_is_a_fetch_error() {
        let source =
            FileSource::from_config(&json!({"path": "file:///does/not/exist.yaml"})).unwrap();
        assert!(source.fetch().await.is_err());
    }
}
