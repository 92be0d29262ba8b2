//! Autoscaling groups

use serde::{Deserialize, Serialize};

use super::size_filter;
use crate::filters::{Filter, FilterError};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AutoScalingGroupDetail {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desired_capacity: Option<i64>,
    /// Member instance ids
    #[serde(default)]
    pub instances: Vec<String>,
}

impl AutoScalingGroupDetail {
    pub(super) fn filter(&self, filter: &Filter) -> Option<Result<bool, FilterError>> {
        size_filter(filter, self.desired_capacity)
    }
}
