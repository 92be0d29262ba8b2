//! Provider collaborator boundary
//!
//! The engine never talks to a cloud API directly. Discovery yields
//! snapshots per resource kind; mutation terminates, stops and tags
//! resources. Both report failures as [`ProviderError`]s.

mod inventory;
mod logging;

use std::future::Future;

use futures::stream::BoxStream;
use reaper_common::ResourceKind;

pub use inventory::InventoryFile;
pub use logging::LoggingMutator;

use crate::error::ProviderError;
use crate::resource::ResourceSnapshot;

/// Stream of discovered resources for one kind
pub type SnapshotStream = BoxStream<'static, Result<ResourceSnapshot, ProviderError>>;

/// Enumerates resources of one kind across all configured regions.
///
/// The stream is lazy and finite. An `Err` item reports a failure without
/// ending the stream; the consumer logs it and keeps draining.
pub trait Discovery: Send + Sync + 'static {
    fn discover(&self, kind: ResourceKind) -> SnapshotStream;
}

/// Mutates resources on the provider side
pub trait Mutator: Send + Sync + 'static {
    /// Delete the resource
    fn terminate(
        &self,
        kind: ResourceKind,
        region: &str,
        id: &str,
    ) -> impl Future<Output = Result<(), ProviderError>> + Send;

    /// Stop the resource, or scale a group to zero
    fn stop(
        &self,
        kind: ResourceKind,
        region: &str,
        id: &str,
    ) -> impl Future<Output = Result<(), ProviderError>> + Send;

    /// Stop without waiting for a graceful shutdown
    fn force_stop(
        &self,
        kind: ResourceKind,
        region: &str,
        id: &str,
    ) -> impl Future<Output = Result<(), ProviderError>> + Send;

    /// Create or overwrite a tag
    fn tag(
        &self,
        kind: ResourceKind,
        region: &str,
        id: &str,
        key: &str,
        value: &str,
    ) -> impl Future<Output = Result<(), ProviderError>> + Send;

    /// Remove a tag
    fn untag(
        &self,
        kind: ResourceKind,
        region: &str,
        id: &str,
        key: &str,
    ) -> impl Future<Output = Result<(), ProviderError>> + Send;
}
