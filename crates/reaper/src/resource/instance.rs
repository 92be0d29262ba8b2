//! Virtual machine instances

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::filters::{Filter, FilterError};

/// Provider-reported instance lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstanceState {
    Pending,
    Running,
    ShuttingDown,
    Terminated,
    Stopping,
    Stopped,
}

impl InstanceState {
    pub fn as_str(self) -> &'static str {
        match self {
            InstanceState::Pending => "pending",
            InstanceState::Running => "running",
            InstanceState::ShuttingDown => "shutting-down",
            InstanceState::Terminated => "terminated",
            InstanceState::Stopping => "stopping",
            InstanceState::Stopped => "stopped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceDetail {
    pub instance_type: String,
    pub state: InstanceState,
    /// Attached security groups, id to group name
    #[serde(default)]
    pub security_groups: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_ip: Option<String>,
    /// Member of an autoscaling group
    #[serde(default)]
    pub autoscaled: bool,
}

impl InstanceDetail {
    pub fn new(instance_type: impl Into<String>, state: InstanceState) -> Self {
        Self {
            instance_type: instance_type.into(),
            state,
            security_groups: BTreeMap::new(),
            public_ip: None,
            autoscaled: false,
        }
    }

    /// Stopped and terminated instances are left out of per-type totals
    pub fn counts_towards_totals(&self) -> bool {
        !matches!(
            self.state,
            InstanceState::Stopped | InstanceState::Terminated
        )
    }

    pub(super) fn filter(&self, filter: &Filter) -> Option<Result<bool, FilterError>> {
        let result = match filter.function.as_str() {
            "State" => filter.argument(0).map(|s| s == self.state.as_str()),
            "NotState" => filter.argument(0).map(|s| s != self.state.as_str()),
            "InstanceType" => Ok(filter.any_argument_is(&self.instance_type)),
            "NotInstanceType" => Ok(!filter.any_argument_is(&self.instance_type)),
            "HasPublicIPAddress" => Ok(self.public_ip.is_some()),
            "AutoScaled" => Ok(self.autoscaled),
            "NotAutoScaled" => Ok(!self.autoscaled),
            _ => return None,
        };
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_filters() {
        let mut detail = InstanceDetail::new("m5.large", InstanceState::Running);
        detail.public_ip = Some("203.0.113.7".into());

        let eval = |f: &str, args: &[&str]| {
            detail
                .filter(&Filter::new(f, args.iter().copied()))
                .unwrap()
                .unwrap()
        };
        assert!(eval("State", &["running"]));
        assert!(eval("NotState", &["stopped"]));
        assert!(eval("InstanceType", &["t3.micro", "m5.large"]));
        assert!(!eval("NotInstanceType", &["m5.large"]));
        assert!(eval("HasPublicIPAddress", &[]));
        assert!(eval("NotAutoScaled", &[]));
        assert!(detail.filter(&Filter::new("Tagged", ["x"])).is_none());
    }

    #[test]
    fn test_stopped_instances_not_counted() {
        assert!(InstanceDetail::new("t3.micro", InstanceState::Running).counts_towards_totals());
        assert!(InstanceDetail::new("t3.micro", InstanceState::Pending).counts_towards_totals());
        assert!(!InstanceDetail::new("t3.micro", InstanceState::Stopped).counts_towards_totals());
        assert!(!InstanceDetail::new("t3.micro", InstanceState::Terminated).counts_towards_totals());
    }

    #[test]
    fn test_state_serde_matches_as_str() {
        for state in [InstanceState::ShuttingDown, InstanceState::Running] {
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(json, format!("\"{}\"", state.as_str()));
        }
    }
}
