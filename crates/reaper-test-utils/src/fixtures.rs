//! Snapshot builders and test configuration

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use reaper::config::Config;
use reaper::resource::{
    AutoScalingGroupDetail, InstanceDetail, InstanceState, ResourceDetail, ResourceSnapshot,
    SecurityGroupDetail, StackDetail, VolumeDetail,
};

/// Region used by every builder
pub const TEST_REGION: &str = "us-east-1";

/// Token secret in [`test_config`]
pub const TEST_SECRET: &str = "test-secret";

fn snapshot(id: &str, detail: ResourceDetail) -> ResourceSnapshot {
    ResourceSnapshot {
        region: TEST_REGION.to_string(),
        id: id.to_string(),
        name: None,
        tags: HashMap::new(),
        created_at: None,
        detail,
    }
}

/// A running instance with the given security groups (`id`, `name`)
pub fn instance(id: &str, security_groups: &[(&str, &str)]) -> ResourceSnapshot {
    let mut detail = InstanceDetail::new("t3.micro", InstanceState::Running);
    detail.security_groups = security_groups
        .iter()
        .map(|(id, name)| (id.to_string(), name.to_string()))
        .collect::<BTreeMap<_, _>>();
    snapshot(id, ResourceDetail::Instance(detail))
}

/// An autoscaling group with members
pub fn asg(id: &str, members: &[&str]) -> ResourceSnapshot {
    snapshot(
        id,
        ResourceDetail::AutoScalingGroup(AutoScalingGroupDetail {
            desired_capacity: Some(members.len() as i64),
            instances: members.iter().map(|m| m.to_string()).collect(),
        }),
    )
}

pub fn security_group(id: &str) -> ResourceSnapshot {
    snapshot(id, ResourceDetail::SecurityGroup(SecurityGroupDetail::default()))
}

/// An unattached volume
pub fn volume(id: &str, size_gb: i64) -> ResourceSnapshot {
    snapshot(id, ResourceDetail::Volume(VolumeDetail::new(size_gb, "available")))
}

/// A stack managing the given resource ids
pub fn stack(id: &str, managed: &[&str]) -> ResourceSnapshot {
    let mut detail = StackDetail::new("CREATE_COMPLETE");
    detail.managed_resources = managed.iter().map(|m| m.to_string()).collect();
    snapshot(id, ResourceDetail::Stack(detail))
}

/// Chainable tweaks for builder output
pub trait SnapshotExt: Sized {
    fn tag(self, key: &str, value: &str) -> Self;
    fn named(self, name: &str) -> Self;
    fn created(self, at: DateTime<Utc>) -> Self;
    fn owned_by(self, owner: &str) -> Self {
        self.tag(reaper_common::tags::TAG_OWNER, owner)
    }
}

impl SnapshotExt for ResourceSnapshot {
    fn tag(mut self, key: &str, value: &str) -> Self {
        self.tags.insert(key.to_string(), value.to_string());
        self
    }

    fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    fn created(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = Some(at);
        self
    }
}

/// Every kind enabled with no filter groups, so everything not excluded
/// by dependency or whitelist is reapable.
pub fn test_config() -> Config {
    let mut config = Config::from_toml(&format!(
        r#"
        [owners]
        default_email_host = "example.com"
        default_owner = "admins@example.com"

        [http]
        api_url = "https://reaper.example.com/api"
        token_secret = "{TEST_SECRET}"

        [notifications]
        interval = "1h"
        first_stage = "1h"
        second_stage = "1h"
        third_stage = "1h"

        [instances]
        enabled = true
        [autoscaling_groups]
        enabled = true
        [security_groups]
        enabled = true
        [volumes]
        enabled = true
        [stacks]
        enabled = true
        "#
    ))
    .unwrap_or_else(|e| panic!("test config does not parse: {e}"));
    config.event_tag = "reaper-test".to_string();
    config
}
