//! Discovery from a JSON inventory snapshot
//!
//! The file holds a JSON array of resource snapshots, each tagged with its
//! `kind`. It is re-read on every discovery so that a long-running reaper
//! picks up a refreshed export.

use std::path::{Path, PathBuf};

use futures::StreamExt;
use futures::stream;
use reaper_common::ResourceKind;
use tracing::debug;

use super::{Discovery, SnapshotStream};
use crate::error::ProviderError;
use crate::resource::ResourceSnapshot;

/// [`Discovery`] backed by an inventory file on disk
#[derive(Debug, Clone)]
pub struct InventoryFile {
    path: PathBuf,
}

impl InventoryFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

async fn read_snapshots(path: &Path) -> Result<Vec<ResourceSnapshot>, ProviderError> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        ProviderError::with_code(
            "InventoryUnreadable",
            format!("failed to read {}: {e}", path.display()),
        )
    })?;
    serde_json::from_str(&content).map_err(|e| {
        ProviderError::with_code(
            "InventoryMalformed",
            format!("failed to parse {}: {e}", path.display()),
        )
    })
}

impl Discovery for InventoryFile {
    fn discover(&self, kind: ResourceKind) -> SnapshotStream {
        let path = self.path.clone();
        stream::once(async move { read_snapshots(&path).await })
            .flat_map(move |result| match result {
                Ok(snapshots) => {
                    let matching: Vec<_> = snapshots
                        .into_iter()
                        .filter(|s| s.detail.kind() == kind)
                        .map(Ok)
                        .collect();
                    debug!(kind = %kind, count = matching.len(), "Read inventory");
                    stream::iter(matching).boxed()
                }
                Err(e) => stream::iter([Err(e)]).boxed(),
            })
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const INVENTORY: &str = r#"[
        {"kind": "instance", "region": "us-east-1", "id": "i-1",
         "instance_type": "t3.micro", "state": "running",
         "security_groups": {"sg-1": "web"}},
        {"kind": "volume", "region": "us-east-1", "id": "vol-1",
         "size_gb": 100, "state": "available"},
        {"kind": "instance", "region": "eu-west-1", "id": "i-2",
         "instance_type": "m5.large", "state": "stopped",
         "tags": {"Owner": "alice@example.com"}}
    ]"#;

    #[tokio::test]
    async fn test_discover_filters_by_kind() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(INVENTORY.as_bytes()).unwrap();
        let inventory = InventoryFile::new(file.path());

        let instances: Vec<_> = inventory
            .discover(ResourceKind::Instance)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(instances.len(), 2);
        assert_eq!(instances[1].tags["Owner"], "alice@example.com");

        let volumes: Vec<_> = inventory
            .discover(ResourceKind::Volume)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(volumes.len(), 1);

        let stacks: Vec<_> = inventory
            .discover(ResourceKind::Stack)
            .try_collect()
            .await
            .unwrap();
        assert!(stacks.is_empty());
    }

    #[tokio::test]
    async fn test_missing_file_yields_error_item() {
        let inventory = InventoryFile::new("/nonexistent/inventory.json");
        let items: Vec<_> = inventory.discover(ResourceKind::Volume).collect().await;
        assert_eq!(items.len(), 1);
        let err = items[0].as_ref().unwrap_err();
        assert_eq!(err.code.as_deref(), Some("InventoryUnreadable"));
    }
}
