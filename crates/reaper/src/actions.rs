//! Owner actions arriving through signed links
//!
//! The action endpoint hands over the action name and token from the link's
//! query string. The token is verified, its target looked up in the registry,
//! and the matching mutation applied immediately.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reaper_common::tags::{
    TAG_REAPER_STATE, TAG_SCALE_DOWN_SCHEDULE, TAG_SCALE_UP_SCHEDULE, WHITELIST_VALUE,
};
use tracing::{info, warn};

use crate::error::ReaperError;
use crate::provider::Mutator;
use crate::registry::Registry;
use crate::resource::Resource;
use crate::token::{Action, ActionToken, LinkSigner};

/// Applies verified owner actions to registry entries and the provider
pub struct ActionHandler<M> {
    registry: Registry,
    mutator: Arc<M>,
    signer: LinkSigner,
    whitelist_tag: String,
    dry_run: bool,
}

impl<M: Mutator> ActionHandler<M> {
    pub fn new(
        registry: Registry,
        mutator: Arc<M>,
        signer: LinkSigner,
        whitelist_tag: impl Into<String>,
        dry_run: bool,
    ) -> Self {
        Self {
            registry,
            mutator,
            signer,
            whitelist_tag: whitelist_tag.into(),
            dry_run,
        }
    }

    /// Verify `token` and apply its action.
    ///
    /// `action_name` must agree with the action inside the token. Returns the
    /// applied token on success.
    pub async fn handle(
        &self,
        action_name: &str,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<ActionToken, ReaperError> {
        let verified = self.signer.verify(token)?;
        if verified.action.name() != action_name {
            return Err(ReaperError::InvalidToken(format!(
                "link action '{action_name}' does not match token action '{}'",
                verified.action.name()
            )));
        }

        let resource = self.registry.get(&verified.region, &verified.id)?;
        match &verified.action {
            Action::Terminate => self.terminate(&resource).await?,
            Action::Stop => self.stop(&resource).await?,
            Action::ForceStop => self.force_stop(&resource).await?,
            Action::Whitelist => self.whitelist(&resource).await?,
            Action::Ignore { duration_secs } => {
                self.ignore(&resource, Duration::from_secs(*duration_secs), now)
                    .await?
            }
            Action::Schedule {
                scale_down,
                scale_up,
            } => self.schedule(&resource, scale_down, scale_up).await?,
        }
        Ok(verified)
    }

    async fn terminate(&self, resource: &Resource) -> Result<(), ReaperError> {
        if self.dry_run {
            info!(resource = %resource, "[DRY RUN] Would terminate");
            return Ok(());
        }
        self.mutator
            .terminate(resource.kind(), &resource.region, &resource.id)
            .await
            .inspect_err(|e| warn!(resource = %resource, error = %e, "Terminate failed"))?;
        info!(resource = %resource, "Terminated");
        Ok(())
    }

    async fn stop(&self, resource: &Resource) -> Result<(), ReaperError> {
        if self.dry_run {
            info!(resource = %resource, "[DRY RUN] Would stop");
            return Ok(());
        }
        self.mutator
            .stop(resource.kind(), &resource.region, &resource.id)
            .await
            .inspect_err(|e| warn!(resource = %resource, error = %e, "Stop failed"))?;
        info!(resource = %resource, "Stopped");
        Ok(())
    }

    async fn force_stop(&self, resource: &Resource) -> Result<(), ReaperError> {
        if self.dry_run {
            info!(resource = %resource, "[DRY RUN] Would force stop");
            return Ok(());
        }
        self.mutator
            .force_stop(resource.kind(), &resource.region, &resource.id)
            .await
            .inspect_err(|e| warn!(resource = %resource, error = %e, "Force stop failed"))?;
        info!(resource = %resource, "Force stopped");
        Ok(())
    }

    async fn whitelist(&self, resource: &Resource) -> Result<(), ReaperError> {
        self.write_tag(resource, &self.whitelist_tag, WHITELIST_VALUE)
            .await?;
        let tag = self.whitelist_tag.clone();
        self.registry.update(&resource.region, &resource.id, |r| {
            r.tags.insert(tag, WHITELIST_VALUE.to_string());
        })?;
        info!(resource = %resource, "Whitelisted");
        Ok(())
    }

    async fn ignore(
        &self,
        resource: &Resource,
        duration: Duration,
        now: DateTime<Utc>,
    ) -> Result<(), ReaperError> {
        let updated = self.registry.update(&resource.region, &resource.id, |r| {
            r.reaper_state.set_ignore(duration, now);
            r.state_updated = true;
        })?;
        let value = updated.reaper_state.to_string();
        self.write_tag(&updated, TAG_REAPER_STATE, &value).await?;
        info!(
            resource = %resource,
            until = %updated.reaper_state.until(),
            "Ignored"
        );
        Ok(())
    }

    async fn schedule(
        &self,
        resource: &Resource,
        scale_down: &str,
        scale_up: &str,
    ) -> Result<(), ReaperError> {
        self.write_tag(resource, TAG_SCALE_DOWN_SCHEDULE, scale_down)
            .await?;
        self.write_tag(resource, TAG_SCALE_UP_SCHEDULE, scale_up)
            .await?;
        self.registry.update(&resource.region, &resource.id, |r| {
            r.tags
                .insert(TAG_SCALE_DOWN_SCHEDULE.to_string(), scale_down.to_string());
            r.tags
                .insert(TAG_SCALE_UP_SCHEDULE.to_string(), scale_up.to_string());
        })?;
        info!(resource = %resource, scale_down, scale_up, "Schedule bound");
        Ok(())
    }

    async fn write_tag(&self, resource: &Resource, key: &str, value: &str) -> Result<(), ReaperError> {
        if self.dry_run {
            info!(resource = %resource, key, value, "[DRY RUN] Would tag");
            return Ok(());
        }
        self.mutator
            .tag(resource.kind(), &resource.region, &resource.id, key, value)
            .await
            .inspect_err(|e| warn!(resource = %resource, key, error = %e, "Tagging failed"))?;
        Ok(())
    }
}
