//! Shared resource model
//!
//! Every discovered resource is a [`Resource`]: identity, tags, dependency
//! flags and lifecycle state common to all kinds, plus a closed
//! [`ResourceDetail`] variant carrying the kind-specific fields. Filter
//! dispatch is a single match over that variant.

mod autoscaling;
mod instance;
mod security_group;
mod stack;
mod volume;

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};
use reaper_common::ResourceKind;
use reaper_common::tags::{
    TAG_REAPER_STATE, TAG_SCALE_DOWN_SCHEDULE, TAG_SCALE_UP_SCHEDULE, TAG_STACK_NAME,
};
use serde::{Deserialize, Serialize};

pub use autoscaling::AutoScalingGroupDetail;
pub use instance::{InstanceDetail, InstanceState};
pub use security_group::SecurityGroupDetail;
pub use stack::StackDetail;
pub use volume::VolumeDetail;

use crate::filters::{Filter, FilterError, FilterGroup, Filterable};
use crate::state::ReaperState;

/// Kind-specific fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceDetail {
    Instance(InstanceDetail),
    AutoScalingGroup(AutoScalingGroupDetail),
    SecurityGroup(SecurityGroupDetail),
    Volume(VolumeDetail),
    Stack(StackDetail),
}

impl ResourceDetail {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceDetail::Instance(_) => ResourceKind::Instance,
            ResourceDetail::AutoScalingGroup(_) => ResourceKind::AutoScalingGroup,
            ResourceDetail::SecurityGroup(_) => ResourceKind::SecurityGroup,
            ResourceDetail::Volume(_) => ResourceKind::Volume,
            ResourceDetail::Stack(_) => ResourceKind::Stack,
        }
    }
}

/// What a discovery collaborator reports for one resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    pub region: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub detail: ResourceDetail,
}

/// A discovered resource and everything the engine knows about it
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub region: String,
    pub id: String,
    pub name: Option<String>,
    pub tags: HashMap<String, String>,
    pub created_at: Option<DateTime<Utc>>,
    /// Another live resource relies on this one
    pub dependency: bool,
    /// Managed by a stack deployment; implies `dependency`
    pub in_stack: bool,
    pub reaper_state: ReaperState,
    /// The lifecycle state changed this cycle and must be written back
    pub state_updated: bool,
    /// Groups this resource has matched, never pruned
    pub matched_filter_groups: BTreeMap<String, FilterGroup>,
    pub detail: ResourceDetail,
}

impl Resource {
    /// Bare resource with a fresh lifecycle state
    pub fn new(
        region: impl Into<String>,
        id: impl Into<String>,
        detail: ResourceDetail,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            region: region.into(),
            id: id.into(),
            name: None,
            tags: HashMap::new(),
            created_at: None,
            dependency: false,
            in_stack: false,
            reaper_state: ReaperState::new(now),
            state_updated: false,
            matched_filter_groups: BTreeMap::new(),
            detail,
        }
    }

    /// Build from a discovery snapshot.
    ///
    /// The lifecycle state is restored from the reaper state tag when it
    /// parses, and a stack-name tag marks the resource as stack-managed.
    pub fn from_snapshot(snapshot: ResourceSnapshot, now: DateTime<Utc>) -> Self {
        let reaper_state = ReaperState::from_tag_or_new(
            snapshot.tags.get(TAG_REAPER_STATE).map(String::as_str),
            now,
        );
        let in_stack = snapshot.tags.contains_key(TAG_STACK_NAME);

        Self {
            region: snapshot.region,
            id: snapshot.id,
            name: snapshot.name,
            tags: snapshot.tags,
            created_at: snapshot.created_at,
            dependency: in_stack,
            in_stack,
            reaper_state,
            state_updated: false,
            matched_filter_groups: BTreeMap::new(),
            detail: snapshot.detail,
        }
    }

    /// Inverse of [`Resource::from_snapshot`], dropping engine-derived fields
    pub fn to_snapshot(&self) -> ResourceSnapshot {
        ResourceSnapshot {
            region: self.region.clone(),
            id: self.id.clone(),
            name: self.name.clone(),
            tags: self.tags.clone(),
            created_at: self.created_at,
            detail: self.detail.clone(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn kind(&self) -> ResourceKind {
        self.detail.kind()
    }

    pub fn key(&self) -> (String, String) {
        (self.region.clone(), self.id.clone())
    }

    pub fn tagged(&self, key: &str) -> bool {
        self.tags.contains_key(key)
    }

    /// Tag value, or the empty string when absent
    pub fn tag(&self, key: &str) -> &str {
        self.tags.get(key).map(String::as_str).unwrap_or("")
    }

    pub fn name_or_empty(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }

    /// Mark as stack-managed, which also makes it a dependency
    pub fn mark_in_stack(&mut self) {
        self.in_stack = true;
        self.dependency = true;
    }

    /// Normalized owner address from `owner_tag`.
    ///
    /// A value containing `@` is taken as an address; a bare user name is
    /// qualified with `default_email_host` when one is configured.
    pub fn owner(&self, owner_tag: &str, default_email_host: Option<&str>) -> Option<String> {
        let raw = self.tags.get(owner_tag)?.trim();
        if raw.is_empty() {
            return None;
        }
        if raw.contains('@') {
            return Some(raw.to_lowercase());
        }
        default_email_host
            .filter(|host| !host.is_empty())
            .map(|host| format!("{raw}@{host}").to_lowercase())
    }

    /// Scale-down and scale-up expressions, when both schedule tags are set
    pub fn schedule(&self) -> Option<(&str, &str)> {
        let down = self.tags.get(TAG_SCALE_DOWN_SCHEDULE)?;
        let up = self.tags.get(TAG_SCALE_UP_SCHEDULE)?;
        Some((down.as_str(), up.as_str()))
    }

    /// Record the definitions of newly matched groups
    pub fn record_matches<'a>(
        &mut self,
        names: impl IntoIterator<Item = &'a String>,
        groups: &BTreeMap<String, FilterGroup>,
    ) {
        for name in names {
            if let Some(group) = groups.get(name) {
                self.matched_filter_groups
                    .insert(name.clone(), group.clone());
            }
        }
    }

    /// Filters every kind understands
    fn common_filter(&self, filter: &Filter, now: DateTime<Utc>) -> Result<bool, FilterError> {
        let matched = match filter.function.as_str() {
            "InCloudformation" => self.in_stack == filter.bool_value(0)?,
            "IsDependency" => self.dependency == filter.bool_value(0)?,
            "Region" => filter.any_argument_is(&self.region),
            "NotRegion" => !filter.any_argument_is(&self.region),
            "Tagged" => self.tagged(filter.argument(0)?),
            "NotTagged" => !self.tagged(filter.argument(0)?),
            "TagNotEqual" => self.tag(filter.argument(0)?) != filter.argument(1)?,
            "ReaperState" => self.reaper_state.stage().as_str() == filter.argument(0)?,
            "NotReaperState" => self.reaper_state.stage().as_str() != filter.argument(0)?,
            "Named" => self.name_or_empty() == filter.argument(0)?,
            "NotNamed" => self.name_or_empty() != filter.argument(0)?,
            "NameContains" => self.name_or_empty().contains(filter.argument(0)?),
            "NotNameContains" => !self.name_or_empty().contains(filter.argument(0)?),
            "CreatedTimeInTheLast" => {
                let cutoff = now - filter.duration_value(0)?;
                self.created_at.is_some_and(|t| t > cutoff)
            }
            "CreatedTimeNotInTheLast" => {
                let cutoff = now - filter.duration_value(0)?;
                self.created_at.is_some_and(|t| t < cutoff)
            }
            _ => return Err(filter.unknown()),
        };
        Ok(matched)
    }
}

impl Filterable for Resource {
    fn filter(&self, filter: &Filter, now: DateTime<Utc>) -> Result<bool, FilterError> {
        let specific = match &self.detail {
            ResourceDetail::Instance(d) => d.filter(filter),
            ResourceDetail::AutoScalingGroup(d) => d.filter(filter),
            ResourceDetail::SecurityGroup(d) => d.filter(filter),
            ResourceDetail::Volume(d) => d.filter(filter),
            ResourceDetail::Stack(d) => d.filter(filter),
        };
        match specific {
            Some(result) => result,
            None => self.common_filter(filter, now),
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind().display_name(), self.id)?;
        if let Some(name) = self.name.as_deref().filter(|n| !n.is_empty() && *n != self.id) {
            write!(f, " \"{name}\"")?;
        }
        write!(f, " in {}", self.region)
    }
}

/// Compare a size-like field against an integer argument.
///
/// Shared by the `Size*` filters of groups and volumes. Returns `None` when
/// the function is not a size comparison.
fn size_filter(filter: &Filter, size: Option<i64>) -> Option<Result<bool, FilterError>> {
    let op: fn(i64, i64) -> bool = match filter.function.as_str() {
        "SizeGreaterThan" => |a, b| a > b,
        "SizeLessThan" => |a, b| a < b,
        "SizeEqualTo" => |a, b| a == b,
        "SizeGreaterThanOrEqualTo" => |a, b| a >= b,
        "SizeLessThanOrEqualTo" => |a, b| a <= b,
        _ => return None,
    };
    Some(
        filter
            .int64_value(0)
            .map(|arg| size.is_some_and(|s| op(s, arg))),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Stage;
    use chrono::{TimeDelta, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    fn sg(id: &str) -> Resource {
        Resource::new(
            "us-east-1",
            id,
            ResourceDetail::SecurityGroup(SecurityGroupDetail::default()),
            now(),
        )
    }

    fn check(resource: &Resource, function: &str, args: &[&str]) -> bool {
        resource
            .filter(&Filter::new(function, args.iter().copied()), now())
            .unwrap()
    }

    #[test]
    fn test_snapshot_restores_state_and_stack_marks() {
        let json = r#"{
            "region": "us-east-1",
            "id": "sg-1",
            "name": "web",
            "kind": "security_group",
            "tags": {
                "REAPER": "SECOND|1700000000|1700003600",
                "aws:cloudformation:stack-name": "prod"
            }
        }"#;
        let snapshot: ResourceSnapshot = serde_json::from_str(json).unwrap();
        let resource = Resource::from_snapshot(snapshot, now());
        assert_eq!(resource.kind(), ResourceKind::SecurityGroup);
        assert_eq!(resource.reaper_state.stage(), Stage::Second);
        assert!(resource.in_stack);
        assert!(resource.dependency);
    }

    #[test]
    fn test_bad_state_tag_falls_back_to_fresh() {
        let resource = Resource::from_snapshot(
            sg("sg-2").with_tag(TAG_REAPER_STATE, "nonsense").to_snapshot(),
            now(),
        );
        assert_eq!(resource.reaper_state, ReaperState::new(now()));
    }

    #[test]
    fn test_owner_normalization() {
        let r = sg("sg-1").with_tag("Owner", "Alice@Example.COM");
        assert_eq!(r.owner("Owner", None).as_deref(), Some("alice@example.com"));

        let r = sg("sg-1").with_tag("Owner", "bob");
        assert_eq!(r.owner("Owner", None), None);
        assert_eq!(
            r.owner("Owner", Some("example.com")).as_deref(),
            Some("bob@example.com")
        );

        assert_eq!(sg("sg-1").with_tag("Owner", "  ").owner("Owner", Some("x.y")), None);
        assert_eq!(sg("sg-1").owner("Owner", Some("x.y")), None);
    }

    #[test]
    fn test_common_filters() {
        let r = sg("sg-1")
            .with_name("build-cache")
            .with_tag("team", "infra")
            .with_created_at(now() - TimeDelta::hours(48));

        assert!(check(&r, "Region", &["eu-west-1", "us-east-1"]));
        assert!(!check(&r, "NotRegion", &["us-east-1"]));
        assert!(check(&r, "Tagged", &["team"]));
        assert!(check(&r, "NotTagged", &["Owner"]));
        assert!(check(&r, "TagNotEqual", &["team", "web"]));
        assert!(!check(&r, "TagNotEqual", &["team", "infra"]));
        assert!(check(&r, "TagNotEqual", &["missing", "x"]));
        assert!(check(&r, "Named", &["build-cache"]));
        assert!(check(&r, "NameContains", &["cache"]));
        assert!(check(&r, "NotNameContains", &["prod"]));
        assert!(check(&r, "ReaperState", &["IGNORE"]));
        assert!(check(&r, "NotReaperState", &["FINAL"]));
        assert!(check(&r, "IsDependency", &["false"]));
        assert!(check(&r, "InCloudformation", &["false"]));
        assert!(check(&r, "CreatedTimeNotInTheLast", &["24h"]));
        assert!(!check(&r, "CreatedTimeInTheLast", &["24h"]));
        assert!(check(&r, "CreatedTimeInTheLast", &["3days"]));
    }

    #[test]
    fn test_created_time_filters_need_a_creation_time() {
        let r = sg("sg-1");
        assert!(!check(&r, "CreatedTimeInTheLast", &["1h"]));
        assert!(!check(&r, "CreatedTimeNotInTheLast", &["1h"]));
    }

    #[test]
    fn test_window_past_earliest_time_fails_only_that_resource() {
        use crate::filters::{FilterGroups, Verdict, evaluate};

        let mut groups = FilterGroups::new();
        groups.insert(
            "ancient".into(),
            FilterGroup::new().with("age", Filter::new("CreatedTimeInTheLast", ["300000years"])),
        );
        let r = sg("sg-1").with_created_at(now() - TimeDelta::hours(1));
        assert_eq!(evaluate(&r, &groups, "Whitelist", now()), Verdict::Failed);

        let mut groups = FilterGroups::new();
        groups.insert(
            "recent".into(),
            FilterGroup::new().with("age", Filter::new("CreatedTimeInTheLast", ["3days"])),
        );
        assert!(evaluate(&r, &groups, "Whitelist", now()).is_reapable());
    }

    #[test]
    fn test_unknown_and_malformed_filters_error() {
        let r = sg("sg-1");
        assert!(matches!(
            r.filter(&Filter::new("SizeGreaterThan", ["1"]), now()),
            Err(FilterError::UnknownFunction(_))
        ));
        assert!(matches!(
            r.filter(&Filter::new("CreatedTimeInTheLast", ["soon"]), now()),
            Err(FilterError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_schedule_requires_both_tags() {
        let r = sg("sg-1").with_tag(TAG_SCALE_DOWN_SCHEDULE, "0 18 * * *");
        assert_eq!(r.schedule(), None);
        let r = r.with_tag(TAG_SCALE_UP_SCHEDULE, "0 8 * * *");
        assert_eq!(r.schedule(), Some(("0 18 * * *", "0 8 * * *")));
    }

    #[test]
    fn test_display() {
        assert_eq!(
            sg("sg-1").with_name("web").to_string(),
            "SecurityGroup sg-1 \"web\" in us-east-1"
        );
    }
}
