//! Reapable resource kinds and inference ordering
//!
//! The dependency pass has to visit kinds in a fixed order because later
//! kinds inherit marks established by earlier ones.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kinds of cloud resources the reaper discovers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Stack deployment (marks every physical resource it manages)
    Stack,
    /// Autoscaling group (marks its member instances)
    AutoScalingGroup,
    /// Virtual machine instance (marks its security groups)
    Instance,
    /// Security group
    SecurityGroup,
    /// Block volume
    Volume,
}

impl ResourceKind {
    /// All kinds, in inference order.
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Stack,
        ResourceKind::AutoScalingGroup,
        ResourceKind::Instance,
        ResourceKind::SecurityGroup,
        ResourceKind::Volume,
    ];

    /// Get inference priority (lower number = visited first)
    ///
    /// - 0: Stacks, whose managed resources become dependencies
    /// - 1: Autoscaling groups, matched by id or name; members become dependencies
    /// - 2: Instances, whose security groups become dependencies
    /// - 3: Security groups, matched by id or group name
    /// - 4: Volumes, dependencies when marked or attached
    pub fn inference_priority(self) -> u8 {
        match self {
            ResourceKind::Stack => 0,
            ResourceKind::AutoScalingGroup => 1,
            ResourceKind::Instance => 2,
            ResourceKind::SecurityGroup => 3,
            ResourceKind::Volume => 4,
        }
    }

    /// Stable lowercase identifier, used in tokens and inventory files
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Stack => "stack",
            ResourceKind::AutoScalingGroup => "auto_scaling_group",
            ResourceKind::Instance => "instance",
            ResourceKind::SecurityGroup => "security_group",
            ResourceKind::Volume => "volume",
        }
    }

    /// Statistic name segment, e.g. `reaper.<segment>.total`
    pub fn stat_segment(self) -> &'static str {
        match self {
            ResourceKind::Stack => "cloudformations",
            ResourceKind::AutoScalingGroup => "asgs",
            ResourceKind::Instance => "instances",
            ResourceKind::SecurityGroup => "securitygroups",
            ResourceKind::Volume => "volumes",
        }
    }

    /// Human-readable name used in notifications
    pub fn display_name(self) -> &'static str {
        match self {
            ResourceKind::Stack => "CloudFormation stack",
            ResourceKind::AutoScalingGroup => "AutoScalingGroup",
            ResourceKind::Instance => "Instance",
            ResourceKind::SecurityGroup => "SecurityGroup",
            ResourceKind::Volume => "Volume",
        }
    }

    /// Parse from the identifier produced by [`ResourceKind::as_str`]
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == s)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_is_sorted_by_inference_priority() {
        let priorities: Vec<u8> = ResourceKind::ALL
            .iter()
            .map(|k| k.inference_priority())
            .collect();
        assert_eq!(priorities, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_stacks_before_everything_else() {
        for kind in ResourceKind::ALL.into_iter().skip(1) {
            assert!(
                ResourceKind::Stack.inference_priority() < kind.inference_priority(),
                "stacks must be scanned before {kind}"
            );
        }
    }

    #[test]
    fn test_instances_before_security_groups() {
        assert!(
            ResourceKind::Instance.inference_priority()
                < ResourceKind::SecurityGroup.inference_priority(),
            "instances mark the security groups they use"
        );
    }

    #[test]
    fn test_parse_roundtrip() {
        for kind in ResourceKind::ALL {
            assert_eq!(ResourceKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ResourceKind::parse("bucket"), None);
    }

    #[test]
    fn test_display_matches_as_str() {
        assert_eq!(ResourceKind::AutoScalingGroup.to_string(), "auto_scaling_group");
        assert_eq!(ResourceKind::Volume.stat_segment(), "volumes");
    }
}
