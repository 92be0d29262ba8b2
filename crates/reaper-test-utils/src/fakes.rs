//! In-memory collaborators

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{Result, bail};
use futures::StreamExt;
use futures::stream;
use reaper::error::ProviderError;
use reaper::events::{Notifier, ReapEvent, Statistic};
use reaper::provider::{Discovery, Mutator, SnapshotStream};
use reaper::resource::ResourceSnapshot;
use reaper_common::ResourceKind;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

type Item = Result<ResourceSnapshot, ProviderError>;

/// Discovery serving snapshots held in memory.
///
/// Items are served per kind in insertion order. The contents can be
/// replaced between cycles.
#[derive(Default)]
pub struct FakeDiscovery {
    items: Mutex<HashMap<ResourceKind, Vec<Item>>>,
}

impl FakeDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a list of snapshots
    pub fn with_snapshots(snapshots: impl IntoIterator<Item = ResourceSnapshot>) -> Self {
        let discovery = Self::new();
        for snapshot in snapshots {
            discovery.push(snapshot);
        }
        discovery
    }

    pub fn push(&self, snapshot: ResourceSnapshot) {
        lock(&self.items)
            .entry(snapshot.detail.kind())
            .or_default()
            .push(Ok(snapshot));
    }

    /// Serve a provider error in the middle of `kind`'s stream
    pub fn push_error(&self, kind: ResourceKind, error: ProviderError) {
        lock(&self.items).entry(kind).or_default().push(Err(error));
    }

    /// Drop everything currently served
    pub fn clear(&self) {
        lock(&self.items).clear();
    }
}

impl Discovery for FakeDiscovery {
    fn discover(&self, kind: ResourceKind) -> SnapshotStream {
        let items = lock(&self.items).get(&kind).cloned().unwrap_or_default();
        stream::iter(items).boxed()
    }
}

/// One call made on a [`RecordingMutator`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutatorCall {
    Terminate { region: String, id: String },
    Stop { region: String, id: String },
    ForceStop { region: String, id: String },
    Tag { region: String, id: String, key: String, value: String },
    Untag { region: String, id: String, key: String },
}

/// Mutator that records every call, optionally failing them all
#[derive(Default)]
pub struct RecordingMutator {
    calls: Mutex<Vec<MutatorCall>>,
    fail: AtomicBool,
}

impl RecordingMutator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later call fail with a provider error
    pub fn fail_all(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<MutatorCall> {
        lock(&self.calls).clone()
    }

    /// Values written to `key`, in call order
    pub fn tag_values(&self, id: &str, key: &str) -> Vec<String> {
        lock(&self.calls)
            .iter()
            .filter_map(|call| match call {
                MutatorCall::Tag {
                    id: tagged,
                    key: k,
                    value,
                    ..
                } if tagged == id && k == key => Some(value.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: MutatorCall) -> Result<(), ProviderError> {
        lock(&self.calls).push(call);
        if self.fail.load(Ordering::SeqCst) {
            return Err(ProviderError::with_code("RequestLimitExceeded", "injected failure"));
        }
        Ok(())
    }
}

impl Mutator for RecordingMutator {
    async fn terminate(&self, _kind: ResourceKind, region: &str, id: &str) -> Result<(), ProviderError> {
        self.record(MutatorCall::Terminate {
            region: region.into(),
            id: id.into(),
        })
    }

    async fn stop(&self, _kind: ResourceKind, region: &str, id: &str) -> Result<(), ProviderError> {
        self.record(MutatorCall::Stop {
            region: region.into(),
            id: id.into(),
        })
    }

    async fn force_stop(&self, _kind: ResourceKind, region: &str, id: &str) -> Result<(), ProviderError> {
        self.record(MutatorCall::ForceStop {
            region: region.into(),
            id: id.into(),
        })
    }

    async fn tag(
        &self,
        _kind: ResourceKind,
        region: &str,
        id: &str,
        key: &str,
        value: &str,
    ) -> Result<(), ProviderError> {
        self.record(MutatorCall::Tag {
            region: region.into(),
            id: id.into(),
            key: key.into(),
            value: value.into(),
        })
    }

    async fn untag(&self, _kind: ResourceKind, region: &str, id: &str, key: &str) -> Result<(), ProviderError> {
        self.record(MutatorCall::Untag {
            region: region.into(),
            id: id.into(),
            key: key.into(),
        })
    }
}

/// Notifier that keeps every event and statistic it is given.
///
/// Events for a recipient marked with [`RecordingNotifier::fail_for`] are
/// rejected and not recorded.
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<ReapEvent>>,
    statistics: Mutex<Vec<Statistic>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_for(&self, recipient: impl Into<String>) {
        lock(&self.failing).insert(recipient.into());
    }

    pub fn events(&self) -> Vec<ReapEvent> {
        lock(&self.events).clone()
    }

    pub fn statistics(&self) -> Vec<Statistic> {
        lock(&self.statistics).clone()
    }

    /// Ids of every resource in every delivered event
    pub fn notified_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock(&self.events)
            .iter()
            .flat_map(|event| event.items().iter().map(|item| item.resource.id.clone()))
            .collect();
        ids.sort();
        ids
    }

    /// Sum of every statistic named `name` carrying `tag`
    pub fn statistic_value(&self, name: &str, tag: &str) -> f64 {
        lock(&self.statistics)
            .iter()
            .filter(|s| s.name == name && s.tags.iter().any(|t| t == tag))
            .map(|s| s.value)
            .sum()
    }
}

impl Notifier for RecordingNotifier {
    async fn notify(&self, event: &ReapEvent) -> Result<()> {
        let recipient = event.recipient().unwrap_or_default();
        if lock(&self.failing).contains(recipient) {
            bail!("mailbox for {recipient} is unavailable");
        }
        lock(&self.events).push(event.clone());
        Ok(())
    }

    async fn statistic(&self, stat: &Statistic) -> Result<()> {
        lock(&self.statistics).push(stat.clone());
        Ok(())
    }
}
