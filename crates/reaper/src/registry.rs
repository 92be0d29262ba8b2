//! Thread-safe registry of reapable resources
//!
//! The reap loop `put`s every resource that survives filtering; action
//! handlers look resources up by `(region, id)`. Entries are never removed
//! during a run, so a resource missing from the latest cycle stays reachable
//! under its last-known state until overwritten.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::ReaperError;
use crate::resource::Resource;

type Key = (String, String);

/// Shared `(region, id) → Resource` map.
///
/// Entries are stored as `Arc<Resource>` and replaced whole, so a reader
/// never observes a partially updated resource.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    resources: RwLock<HashMap<Key, Arc<Resource>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store or overwrite the entry for the resource's `(region, id)`
    pub fn put(&self, resource: Resource) {
        let key = resource.key();
        let mut resources = self
            .inner
            .resources
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        resources.insert(key, Arc::new(resource));
    }

    /// Look up a resource, failing with `NotFound` when absent
    pub fn get(&self, region: &str, id: &str) -> Result<Arc<Resource>, ReaperError> {
        let resources = self
            .inner
            .resources
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        resources
            .get(&(region.to_string(), id.to_string()))
            .cloned()
            .ok_or_else(|| ReaperError::not_found(region, id))
    }

    /// Apply `f` to a copy of the entry and store the result.
    ///
    /// The write lock is held across the read-modify-write so concurrent
    /// updates to one key cannot lose each other's changes.
    pub fn update<F>(&self, region: &str, id: &str, f: F) -> Result<Arc<Resource>, ReaperError>
    where
        F: FnOnce(&mut Resource),
    {
        let mut resources = self
            .inner
            .resources
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let key = (region.to_string(), id.to_string());
        let current = resources
            .get(&key)
            .ok_or_else(|| ReaperError::not_found(region, id))?;

        let mut updated = Resource::clone(current);
        f(&mut updated);
        let updated = Arc::new(updated);
        resources.insert(key, Arc::clone(&updated));
        Ok(updated)
    }

    /// Every entry, sorted by `(region, id)`
    pub fn snapshot(&self) -> Vec<Arc<Resource>> {
        let resources = self
            .inner
            .resources
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let mut entries: Vec<_> = resources.values().cloned().collect();
        drop(resources);
        entries.sort_by(|a, b| (&a.region, &a.id).cmp(&(&b.region, &b.id)));
        entries
    }

    pub fn len(&self) -> usize {
        self.inner
            .resources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{ResourceDetail, VolumeDetail};
    use chrono::Utc;

    fn volume(region: &str, id: &str, size: i64) -> Resource {
        Resource::new(
            region,
            id,
            ResourceDetail::Volume(VolumeDetail::new(size, "available")),
            Utc::now(),
        )
    }

    #[test]
    fn test_put_get_overwrite() {
        let registry = Registry::new();
        assert!(registry.is_empty());
        assert!(registry.get("us-east-1", "vol-1").unwrap_err().is_not_found());

        registry.put(volume("us-east-1", "vol-1", 10));
        registry.put(volume("us-east-1", "vol-1", 20));
        registry.put(volume("us-west-2", "vol-1", 30));

        assert_eq!(registry.len(), 2);
        let got = registry.get("us-east-1", "vol-1").unwrap();
        assert!(matches!(&got.detail, ResourceDetail::Volume(v) if v.size_gb == 20));
    }

    #[test]
    fn test_update_replaces_entry() {
        let registry = Registry::new();
        registry.put(volume("us-east-1", "vol-1", 10));
        let before = registry.get("us-east-1", "vol-1").unwrap();

        registry
            .update("us-east-1", "vol-1", |r| {
                r.tags.insert("k".into(), "v".into());
            })
            .unwrap();

        // Readers holding the old entry keep a consistent copy
        assert!(before.tags.is_empty());
        assert_eq!(registry.get("us-east-1", "vol-1").unwrap().tag("k"), "v");
        assert!(
            registry
                .update("us-east-1", "vol-9", |_| {})
                .unwrap_err()
                .is_not_found()
        );
    }

    #[test]
    fn test_snapshot_sorted() {
        let registry = Registry::new();
        registry.put(volume("us-west-2", "vol-a", 1));
        registry.put(volume("us-east-1", "vol-b", 1));
        registry.put(volume("us-east-1", "vol-a", 1));
        let keys: Vec<_> = registry
            .snapshot()
            .iter()
            .map(|r| format!("{},{}", r.region, r.id))
            .collect();
        assert_eq!(keys, ["us-east-1,vol-a", "us-east-1,vol-b", "us-west-2,vol-a"]);
    }

    #[tokio::test]
    async fn test_concurrent_writers_and_readers() {
        let registry = Registry::new();
        let mut handles = Vec::new();
        for writer in 0..8 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..50 {
                    registry.put(volume("us-east-1", &format!("vol-{i}"), writer));
                    let _ = registry.get("us-east-1", &format!("vol-{}", 49 - i));
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(registry.len(), 50);
    }
}
