//! Stack deployments

use serde::{Deserialize, Serialize};

use crate::filters::{Filter, FilterError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackDetail {
    /// Provider stack status, e.g. `CREATE_COMPLETE`
    pub status: String,
    /// Physical ids of every resource the stack manages
    #[serde(default)]
    pub managed_resources: Vec<String>,
}

impl StackDetail {
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            managed_resources: Vec::new(),
        }
    }

    pub(super) fn filter(&self, filter: &Filter) -> Option<Result<bool, FilterError>> {
        let result = match filter.function.as_str() {
            "Status" => Ok(filter.any_argument_is(&self.status)),
            "NotStatus" => Ok(!filter.any_argument_is(&self.status)),
            _ => return None,
        };
        Some(result)
    }
}
