//! Security groups
//!
//! Security groups carry no kind-specific filters; their group name lives in
//! [`Resource::name`](super::Resource::name) so instances can reference them
//! by either id or name.

use serde::{Deserialize, Serialize};

use crate::filters::{Filter, FilterError};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecurityGroupDetail {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl SecurityGroupDetail {
    pub(super) fn filter(&self, _filter: &Filter) -> Option<Result<bool, FilterError>> {
        None
    }
}
