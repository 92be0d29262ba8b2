//! Mutator that only records requested mutations in the log

use reaper_common::ResourceKind;
use tracing::info;

use super::Mutator;
use crate::error::ProviderError;

/// [`Mutator`] for offline runs against an inventory snapshot
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingMutator;

impl Mutator for LoggingMutator {
    async fn terminate(&self, kind: ResourceKind, region: &str, id: &str) -> Result<(), ProviderError> {
        info!(kind = %kind, region, id, "Terminate requested");
        Ok(())
    }

    async fn stop(&self, kind: ResourceKind, region: &str, id: &str) -> Result<(), ProviderError> {
        info!(kind = %kind, region, id, "Stop requested");
        Ok(())
    }

    async fn force_stop(&self, kind: ResourceKind, region: &str, id: &str) -> Result<(), ProviderError> {
        info!(kind = %kind, region, id, "Force stop requested");
        Ok(())
    }

    async fn tag(
        &self,
        kind: ResourceKind,
        region: &str,
        id: &str,
        key: &str,
        value: &str,
    ) -> Result<(), ProviderError> {
        info!(kind = %kind, region, id, key, value, "Tag requested");
        Ok(())
    }

    async fn untag(&self, kind: ResourceKind, region: &str, id: &str, key: &str) -> Result<(), ProviderError> {
        info!(kind = %kind, region, id, key, "Untag requested");
        Ok(())
    }
}
