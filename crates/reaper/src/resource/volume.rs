//! Block volumes

use serde::{Deserialize, Serialize};

use super::size_filter;
use crate::filters::{Filter, FilterError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeDetail {
    pub size_gb: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_type: Option<String>,
    /// Provider volume state, e.g. `available` or `in-use`
    pub state: String,
    /// Instance ids from live attachment records
    #[serde(default)]
    pub attachments: Vec<String>,
}

impl VolumeDetail {
    pub fn new(size_gb: i64, state: impl Into<String>) -> Self {
        Self {
            size_gb,
            volume_type: None,
            state: state.into(),
            attachments: Vec::new(),
        }
    }

    pub fn is_attached(&self) -> bool {
        !self.attachments.is_empty()
    }

    pub(super) fn filter(&self, filter: &Filter) -> Option<Result<bool, FilterError>> {
        if let Some(result) = size_filter(filter, Some(self.size_gb)) {
            return Some(result);
        }
        let result = match filter.function.as_str() {
            "State" => filter.argument(0).map(|s| s == self.state),
            "NotState" => filter.argument(0).map(|s| s != self.state),
            "Attached" => filter.bool_value(0).map(|b| b == self.is_attached()),
            _ => return None,
        };
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_filters() {
        let mut detail = VolumeDetail::new(500, "available");
        let eval = |d: &VolumeDetail, f: &str, args: &[&str]| {
            d.filter(&Filter::new(f, args.iter().copied())).unwrap().unwrap()
        };

        assert!(eval(&detail, "SizeGreaterThan", &["100"]));
        assert!(eval(&detail, "State", &["available"]));
        assert!(eval(&detail, "Attached", &["false"]));

        detail.attachments.push("i-1".into());
        detail.state = "in-use".into();
        assert!(eval(&detail, "Attached", &["true"]));
        assert!(eval(&detail, "NotState", &["available"]));
    }
}
