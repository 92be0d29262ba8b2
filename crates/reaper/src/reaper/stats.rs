//! Per-cycle statistic tallies
//!
//! | Statistic | Tags |
//! |-----------|------|
//! | `reaper.<kind>.total` | region |
//! | `reaper.instances.total` | region, instancetype |
//! | `reaper.instances.totalcost` | region, instancetype |
//! | `reaper.asgs.asgsizes` | region, asgsize |
//! | `reaper.volumes.total` | region, volumesize |
//! | `reaper.<kind>.filtered` | region |
//! | `reaper.<kind>.whitelistedCount` | region |
//!
//! Every statistic also carries the configured event tag.

use std::collections::BTreeMap;

use reaper_common::ResourceKind;
use tracing::warn;

use crate::events::Statistic;
use crate::prices::PricesMap;
use crate::resource::{Resource, ResourceDetail};

fn stat_name(kind: ResourceKind, suffix: &str) -> String {
    format!("reaper.{}.{suffix}", kind.stat_segment())
}

fn region_tag(region: &str) -> String {
    format!("region:{region}")
}

/// Counts gathered while draining one kind's discovery stream
#[derive(Debug, Clone)]
pub struct DiscoveryTally {
    kind: ResourceKind,
    totals: BTreeMap<String, u64>,
    instance_types: BTreeMap<(String, String), u64>,
    sizes: BTreeMap<(String, i64), u64>,
}

impl DiscoveryTally {
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            totals: BTreeMap::new(),
            instance_types: BTreeMap::new(),
            sizes: BTreeMap::new(),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn record(&mut self, resource: &Resource) {
        let region = resource.region.clone();
        *self.totals.entry(region.clone()).or_default() += 1;

        match &resource.detail {
            ResourceDetail::Instance(instance) if instance.counts_towards_totals() => {
                *self
                    .instance_types
                    .entry((region, instance.instance_type.clone()))
                    .or_default() += 1;
            }
            ResourceDetail::AutoScalingGroup(group) => {
                if let Some(size) = group.desired_capacity {
                    *self.sizes.entry((region, size)).or_default() += 1;
                }
            }
            ResourceDetail::Volume(volume) => {
                *self.sizes.entry((region, volume.size_gb)).or_default() += 1;
            }
            _ => {}
        }
    }

    /// Number of resources seen in every region
    pub fn total(&self) -> u64 {
        self.totals.values().sum()
    }

    pub fn region_totals(&self) -> &BTreeMap<String, u64> {
        &self.totals
    }

    pub fn statistics(&self, event_tag: &str, prices: &PricesMap) -> Vec<Statistic> {
        let mut stats: Vec<Statistic> = self
            .totals
            .iter()
            .map(|(region, count)| {
                Statistic::new(
                    stat_name(self.kind, "total"),
                    *count as f64,
                    vec![region_tag(region), event_tag.to_string()],
                )
            })
            .collect();

        for ((region, instance_type), count) in &self.instance_types {
            let tags = vec![
                region_tag(region),
                format!("instancetype:{instance_type}"),
                event_tag.to_string(),
            ];
            match prices.get(region).and_then(|types| types.get(instance_type)) {
                Some(price) => stats.push(Statistic::new(
                    "reaper.instances.totalcost",
                    *count as f64 * price,
                    tags.clone(),
                )),
                None if !prices.is_empty() => {
                    warn!(region = %region, instance_type = %instance_type, "No price for instance type");
                }
                None => {}
            }
            stats.push(Statistic::new("reaper.instances.total", *count as f64, tags));
        }

        let (size_stat, size_tag) = match self.kind {
            ResourceKind::AutoScalingGroup => ("reaper.asgs.asgsizes", "asgsize"),
            _ => ("reaper.volumes.total", "volumesize"),
        };
        for ((region, size), count) in &self.sizes {
            stats.push(Statistic::new(
                size_stat,
                *count as f64,
                vec![
                    region_tag(region),
                    format!("{size_tag}:{size}"),
                    event_tag.to_string(),
                ],
            ));
        }

        stats
    }
}

/// Counts of filter outcomes per kind and region
#[derive(Debug, Clone, Default)]
pub struct FilterTally {
    filtered: BTreeMap<(ResourceKind, String), u64>,
    whitelisted: BTreeMap<(ResourceKind, String), u64>,
}

impl FilterTally {
    pub fn record_filtered(&mut self, resource: &Resource) {
        *self
            .filtered
            .entry((resource.kind(), resource.region.clone()))
            .or_default() += 1;
    }

    pub fn record_whitelisted(&mut self, resource: &Resource) {
        *self
            .whitelisted
            .entry((resource.kind(), resource.region.clone()))
            .or_default() += 1;
    }

    pub fn filtered(&self, kind: ResourceKind, region: &str) -> u64 {
        self.filtered
            .get(&(kind, region.to_string()))
            .copied()
            .unwrap_or(0)
    }

    pub fn whitelisted(&self, kind: ResourceKind, region: &str) -> u64 {
        self.whitelisted
            .get(&(kind, region.to_string()))
            .copied()
            .unwrap_or(0)
    }

    pub fn total_whitelisted(&self) -> u64 {
        self.whitelisted.values().sum()
    }

    pub fn statistics(&self, event_tag: &str) -> Vec<Statistic> {
        let filtered = self.filtered.iter().map(|((kind, region), count)| {
            Statistic::new(
                stat_name(*kind, "filtered"),
                *count as f64,
                vec![region_tag(region), event_tag.to_string()],
            )
        });
        let whitelisted = self.whitelisted.iter().map(|((kind, region), count)| {
            Statistic::new(
                stat_name(*kind, "whitelistedCount"),
                *count as f64,
                vec![region_tag(region), event_tag.to_string()],
            )
        });
        filtered.chain(whitelisted).collect()
    }
}
