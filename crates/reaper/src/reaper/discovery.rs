//! Concurrent discovery producers and the ordered drain
//!
//! Every kind gets its own producer task streaming into a bounded channel,
//! so slow kinds are already fetching while earlier kinds are drained. The
//! drain itself visits kinds in inference order, because later kinds rely on
//! marks recorded by earlier ones.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use reaper_common::ResourceKind;
use reaper_common::tags::TAG_REAPER_STATE;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::persist::SavedStates;
use super::stats::DiscoveryTally;
use crate::error::ProviderError;
use crate::inference::InferencePass;
use crate::provider::Discovery;
use crate::registry::Registry;
use crate::resource::{Resource, ResourceSnapshot};
use crate::state::ReaperState;

/// Buffered items per producer before it waits for the drain
const PRODUCER_BUFFER: usize = 64;

type Item = Result<ResourceSnapshot, ProviderError>;

/// A running producer for one kind
pub(super) struct Producer {
    pub kind: ResourceKind,
    rx: mpsc::Receiver<Item>,
}

/// Start one producer per kind, in inference order
pub(super) fn spawn_producers<D: Discovery>(discovery: &Arc<D>) -> Vec<Producer> {
    ResourceKind::ALL
        .into_iter()
        .map(|kind| {
            let (tx, rx) = mpsc::channel(PRODUCER_BUFFER);
            let discovery = Arc::clone(discovery);
            tokio::spawn(async move {
                let mut stream = discovery.discover(kind);
                while let Some(item) = stream.next().await {
                    if tx.send(item).await.is_err() {
                        debug!(kind = %kind, "Discovery drain went away, stopping producer");
                        break;
                    }
                }
            });
            Producer { kind, rx }
        })
        .collect()
}

/// Drain one producer into the inference pass.
///
/// Each resource keeps whichever of its state tag, its registry entry and its
/// saved state was entered most recently. Provider errors are logged and the
/// drain continues with the next item.
pub(super) async fn drain(
    producer: Producer,
    registry: &Registry,
    saved: &SavedStates,
    pass: &mut InferencePass,
    now: DateTime<Utc>,
) -> DiscoveryTally {
    let Producer { kind, mut rx } = producer;
    let mut tally = DiscoveryTally::new(kind);
    let mut errors = 0usize;

    while let Some(item) = rx.recv().await {
        let snapshot = match item {
            Ok(snapshot) => snapshot,
            Err(e) => {
                errors += 1;
                warn!(kind = %kind, error = %e, code = ?e.code, "Discovery failed for a resource");
                continue;
            }
        };
        if snapshot.detail.kind() != kind {
            warn!(
                expected = %kind,
                got = %snapshot.detail.kind(),
                id = %snapshot.id,
                "Discovery returned a resource of the wrong kind, skipping"
            );
            continue;
        }

        let tagged = snapshot
            .tags
            .get(TAG_REAPER_STATE)
            .is_some_and(|value| value.parse::<ReaperState>().is_ok());
        let mut resource = Resource::from_snapshot(snapshot, now);
        let known = registry
            .get(&resource.region, &resource.id)
            .ok()
            .map(|entry| entry.reaper_state)
            .or_else(|| saved.get(&resource.region, &resource.id));
        if let Some(state) = known {
            if !tagged || state.since() > resource.reaper_state.since() {
                debug!(resource = %resource, state = %state, "Restored engine-side reaper state");
                resource.reaper_state = state;
            }
        }
        tally.record(&resource);
        pass.observe(resource);
    }

    for (region, count) in tally.region_totals() {
        info!(kind = %kind, region = %region, count, "Found {} total {}", count, kind.display_name());
    }
    if errors > 0 {
        warn!(kind = %kind, errors, "Discovery finished with errors");
    }
    tally
}
