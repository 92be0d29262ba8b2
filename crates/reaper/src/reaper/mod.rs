//! Reap orchestration loop
//!
//! One cycle: discover every kind, infer dependencies and owners, filter,
//! advance lifecycle states, record survivors in the registry, then hand
//! events, state write-backs and statistics to detached tasks. The scheduler
//! runs one cycle at a time and never waits on those tasks.

mod discovery;
pub mod persist;
pub mod stats;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use reaper_common::tags::TAG_REAPER_STATE;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub use persist::{SavedStates, load_state_file, save_state_file};
pub use stats::{DiscoveryTally, FilterTally};

use crate::actions::ActionHandler;
use crate::config::{Config, ConfigError};
use crate::events::{ActionLinks, EventItem, Notifier, ReapEvent, Statistic};
use crate::filters::{Verdict, evaluate};
use crate::inference::{InferencePass, Inventory};
use crate::prices::{JsonPriceFile, PriceBook, spawn_price_refresh};
use crate::provider::{Discovery, Mutator};
use crate::registry::Registry;
use crate::resource::Resource;
use crate::token::LinkSigner;

/// Summary of one reap cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Resources classified by the inference pass
    pub discovered: usize,
    /// Resources that survived filtering
    pub reapable: usize,
    /// Survivors whose lifecycle state advanced
    pub advanced: usize,
    pub whitelisted: usize,
    /// Owner batch events
    pub batches: usize,
    /// Individual events
    pub individual: usize,
    /// State file written this cycle
    pub state_saved: bool,
}

/// A finished cycle and its still-running background work
pub struct CycleOutcome {
    pub report: CycleReport,
    pub background: Vec<JoinHandle<()>>,
}

impl CycleOutcome {
    /// Wait for dispatch and statistics tasks, logging any that panicked
    pub async fn join_background(self) -> CycleReport {
        log_background(self.background).await;
        self.report
    }
}

async fn log_background(handles: Vec<JoinHandle<()>>) {
    for handle in handles {
        match handle.await {
            Ok(()) => {}
            Err(e) if e.is_panic() => error!(error = ?e, "Background reaper task panicked"),
            Err(e) => debug!(error = ?e, "Background reaper task cancelled"),
        }
    }
}

/// Survivors of filtering, before events are built
#[derive(Default)]
struct Reapables {
    /// Owner buckets with two or more survivors
    batches: Vec<(String, Vec<Resource>)>,
    /// Unowned survivors and singleton owner buckets
    individual: Vec<(Option<String>, Resource)>,
    /// Whitelisted resources still carrying a state tag
    unsave: Vec<Resource>,
}

/// The reaping engine
pub struct Reaper<D, M, N> {
    config: Arc<Config>,
    registry: Registry,
    discovery: Arc<D>,
    mutator: Arc<M>,
    notifier: Arc<N>,
    signer: LinkSigner,
    prices: PriceBook,
    saved_states: Arc<SavedStates>,
}

impl<D: Discovery, M: Mutator, N: Notifier> Reaper<D, M, N> {
    pub fn new(
        config: Config,
        discovery: D,
        mutator: M,
        notifier: N,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let signer = config.link_signer()?;
        Ok(Self {
            config: Arc::new(config),
            registry: Registry::new(),
            discovery: Arc::new(discovery),
            mutator: Arc::new(mutator),
            notifier: Arc::new(notifier),
            signer,
            prices: PriceBook::new(),
            saved_states: Arc::new(SavedStates::new()),
        })
    }

    /// Use states restored from a state file for resources discovered from now on
    pub fn with_saved_states(mut self, states: SavedStates) -> Self {
        self.saved_states = Arc::new(states);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn discovery(&self) -> &Arc<D> {
        &self.discovery
    }

    pub fn mutator(&self) -> &Arc<M> {
        &self.mutator
    }

    pub fn notifier(&self) -> &Arc<N> {
        &self.notifier
    }

    pub fn signer(&self) -> &LinkSigner {
        &self.signer
    }

    pub fn prices(&self) -> &PriceBook {
        &self.prices
    }

    /// Handler for owner actions, sharing this engine's registry and mutator
    pub fn action_handler(&self) -> ActionHandler<M> {
        ActionHandler::new(
            self.registry.clone(),
            Arc::clone(&self.mutator),
            self.signer.clone(),
            self.config.whitelist_tag.clone(),
            self.config.dry_run,
        )
    }

    /// Run cycles until cancelled: one immediately, then every interval.
    ///
    /// A cycle always runs to completion; cancellation is only observed
    /// between cycles.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let price_task = self.config.prices.price_file.clone().map(|path| {
            spawn_price_refresh(
                self.prices.clone(),
                JsonPriceFile::new(path),
                self.config.prices.refresh,
                cancel.child_token(),
            )
        });

        let interval = self.config.notifications.interval;
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Reaper stopping");
                    break;
                }
                _ = ticker.tick() => {
                    let outcome = self.run_cycle().await;
                    info!(
                        reapable = outcome.report.reapable,
                        batches = outcome.report.batches,
                        individual = outcome.report.individual,
                        "Sleeping for {}",
                        humantime::format_duration(interval)
                    );
                    tokio::spawn(log_background(outcome.background));
                }
            }
        }

        if let Some(task) = price_task {
            match task.await {
                Ok(()) => debug!("Price refresh task finished"),
                Err(e) if e.is_panic() => error!(error = ?e, "Price refresh task panicked"),
                Err(e) => debug!(error = ?e, "Price refresh task cancelled"),
            }
        }
    }

    pub async fn run_cycle(&self) -> CycleOutcome {
        self.run_cycle_at(Utc::now()).await
    }

    /// Run one cycle with `now` as the reference time for every decision
    pub async fn run_cycle_at(&self, now: DateTime<Utc>) -> CycleOutcome {
        let mut background = Vec::new();
        let mut report = CycleReport::default();

        let inventory = self.discover(now, &mut background).await;
        report.discovered = inventory.len();

        let mut filter_tally = FilterTally::default();
        let mut reapables = self.filter_inventory(inventory, &mut filter_tally, now);

        let durations = self.config.stage_durations();
        let survivors = reapables
            .batches
            .iter_mut()
            .flat_map(|(_, resources)| resources.iter_mut())
            .chain(reapables.individual.iter_mut().map(|(_, r)| r));
        let mut state_updates = Vec::new();
        for resource in survivors {
            resource.state_updated = resource.reaper_state.advance_if_due(now, &durations);
            if resource.state_updated {
                report.advanced += 1;
                state_updates.push(resource.clone());
            }
            filter_tally.record_filtered(resource);
            report.reapable += 1;
            info!(
                resource = %resource,
                stage = %resource.reaper_state.stage(),
                "Reapable resource discovered"
            );
            self.registry.put(resource.clone());
        }

        let unsave = std::mem::take(&mut reapables.unsave);
        let events = self.build_events(reapables, now);
        for event in &events {
            match event {
                ReapEvent::Batch { .. } => report.batches += 1,
                ReapEvent::Single { .. } => report.individual += 1,
            }
        }
        report.whitelisted = filter_tally.total_whitelisted() as usize;

        background.push(self.spawn_dispatch(events, state_updates, unsave));
        background.push(self.spawn_statistics(filter_tally.statistics(&self.config.event_tag)));

        if let Some(path) = &self.config.state_file {
            let entries = self.registry.snapshot();
            match save_state_file(path, &entries).await {
                Ok(()) => report.state_saved = true,
                Err(e) => error!(error = ?e, "Unable to save reaper states, continuing without persistence"),
            }
        }

        CycleOutcome { report, background }
    }

    async fn discover(
        &self,
        now: DateTime<Utc>,
        background: &mut Vec<JoinHandle<()>>,
    ) -> Inventory {
        let mut pass =
            InferencePass::new(self.config.ownership_rules(), self.config.enabled_kinds());
        let producers = discovery::spawn_producers(&self.discovery);

        for producer in producers {
            let tally =
                discovery::drain(producer, &self.registry, &self.saved_states, &mut pass, now)
                    .await;
            let stats = tally.statistics(&self.config.event_tag, &self.prices.snapshot());
            background.push(self.spawn_statistics(stats));
        }

        pass.finish()
    }

    /// Filter owner buckets and the unowned list.
    ///
    /// An owner left with a single survivor gets an individual event rather
    /// than a batch of one. Each resource is filtered exactly once.
    fn filter_inventory(
        &self,
        inventory: Inventory,
        tally: &mut FilterTally,
        now: DateTime<Utc>,
    ) -> Reapables {
        let mut reapables = Reapables::default();

        for (owner, resources) in inventory.owned {
            let mut survivors = self.apply_filters(resources, tally, &mut reapables.unsave, now);
            match survivors.len() {
                0 => {}
                1 => {
                    let resource = survivors.remove(0);
                    debug!(owner = %owner, resource = %resource, "Single reapable resource, sending individually");
                    reapables.individual.push((Some(owner), resource));
                }
                _ => reapables.batches.push((owner, survivors)),
            }
        }

        let default_owner = self.config.owners.default_owner.clone();
        let unowned = self.apply_filters(inventory.unowned, tally, &mut reapables.unsave, now);
        for resource in unowned {
            reapables.individual.push((default_owner.clone(), resource));
        }

        reapables
    }

    fn apply_filters(
        &self,
        resources: Vec<Resource>,
        tally: &mut FilterTally,
        unsave: &mut Vec<Resource>,
        now: DateTime<Utc>,
    ) -> Vec<Resource> {
        let mut survivors = Vec::new();
        for mut resource in resources {
            let groups = &self.config.for_kind(resource.kind()).filter_groups;
            match evaluate(&resource, groups, &self.config.whitelist_tag, now) {
                Verdict::Reapable { groups: names } => {
                    resource.record_matches(&names, groups);
                    survivors.push(resource);
                }
                Verdict::Whitelisted => {
                    debug!(resource = %resource, "Whitelisted");
                    tally.record_whitelisted(&resource);
                    if resource.tagged(TAG_REAPER_STATE) {
                        unsave.push(resource);
                    }
                }
                Verdict::Dependency => debug!(resource = %resource, "Dependency, not reapable"),
                Verdict::NotMatched | Verdict::Failed => {}
            }
        }
        survivors
    }

    fn build_events(&self, reapables: Reapables, now: DateTime<Utc>) -> Vec<ReapEvent> {
        let mut events = Vec::new();

        for (owner, resources) in reapables.batches {
            let items: Vec<EventItem> = resources
                .into_iter()
                .filter_map(|r| self.event_item(r, now))
                .collect();
            if items.len() > 1 {
                events.push(ReapEvent::Batch { owner, items });
            } else if let Some(item) = items.into_iter().next() {
                events.push(ReapEvent::Single {
                    recipient: Some(owner),
                    item,
                });
            }
        }

        for (recipient, resource) in reapables.individual {
            if let Some(item) = self.event_item(resource, now) {
                events.push(ReapEvent::Single { recipient, item });
            }
        }

        events
    }

    /// Link-bearing event item, or `None` for a snoozed or unlinkable resource
    fn event_item(&self, resource: Resource, now: DateTime<Utc>) -> Option<EventItem> {
        if resource.reaper_state.is_snoozed() {
            debug!(
                resource = %resource,
                until = %resource.reaper_state.until(),
                "Snoozed by owner, not notifying"
            );
            return None;
        }
        match ActionLinks::new(&self.signer, &resource.region, &resource.id, now) {
            Ok(links) => Some(EventItem { resource, links }),
            Err(e) => {
                error!(resource = %resource, error = %e, "Failed to build action links, skipping event item");
                None
            }
        }
    }

    /// Deliver every event, write back advanced states and clear the state
    /// tag of whitelisted resources.
    ///
    /// All deliveries are attempted; a failure is logged and does not stop
    /// the others.
    fn spawn_dispatch(
        &self,
        events: Vec<ReapEvent>,
        state_updates: Vec<Resource>,
        unsave: Vec<Resource>,
    ) -> JoinHandle<()> {
        let notifier = Arc::clone(&self.notifier);
        let mutator = Arc::clone(&self.mutator);
        let dry_run = self.config.dry_run;

        tokio::spawn(async move {
            let deliveries = events.iter().map(|event| {
                let notifier = &notifier;
                async move {
                    if let Err(e) = notifier.notify(event).await {
                        error!(
                            recipient = event.recipient().unwrap_or("<unowned>"),
                            error = ?e,
                            "Failed to dispatch reap event"
                        );
                    }
                }
            });
            join_all(deliveries).await;

            for resource in &state_updates {
                let value = resource.reaper_state.to_string();
                if dry_run {
                    info!(resource = %resource, state = %value, "[DRY RUN] Would save state tag");
                    continue;
                }
                if let Err(e) = mutator
                    .tag(resource.kind(), &resource.region, &resource.id, TAG_REAPER_STATE, &value)
                    .await
                {
                    warn!(resource = %resource, error = %e, "Failed to save state tag");
                }
            }

            for resource in &unsave {
                if dry_run {
                    info!(resource = %resource, "[DRY RUN] Would remove state tag from whitelisted resource");
                    continue;
                }
                info!(resource = %resource, "Removing state tag from whitelisted resource");
                if let Err(e) = mutator
                    .untag(resource.kind(), &resource.region, &resource.id, TAG_REAPER_STATE)
                    .await
                {
                    warn!(resource = %resource, error = %e, "Failed to remove state tag");
                }
            }
        })
    }

    fn spawn_statistics(&self, stats: Vec<Statistic>) -> JoinHandle<()> {
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            for stat in &stats {
                if let Err(e) = notifier.statistic(stat).await {
                    error!(name = %stat.name, error = ?e, "Failed to post statistic");
                }
            }
        })
    }
}
