//! Filter and whitelist engine
//!
//! A [`Filter`] names a predicate and its string arguments. Filters combine
//! into a [`FilterGroup`] (all must match) and groups into a kind's
//! [`FilterGroups`] (any group may match). Filter failures never escape:
//! a bad argument or unknown function is a non-match, and a panic inside a
//! predicate fails the whole resource safe.

use std::collections::BTreeMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::resource::Resource;

/// A single named predicate with its arguments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub function: String,
    #[serde(default)]
    pub arguments: Vec<String>,
}

/// Why a filter could not be evaluated
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FilterError {
    #[error("filter {function} is missing argument {index}")]
    MissingArgument { function: String, index: usize },

    #[error("filter {function} argument '{value}' is not a valid {expected}")]
    InvalidArgument {
        function: String,
        value: String,
        expected: &'static str,
    },

    #[error("no filter function named {0}")]
    UnknownFunction(String),
}

impl Filter {
    pub fn new<I, S>(function: impl Into<String>, arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            function: function.into(),
            arguments: arguments.into_iter().map(Into::into).collect(),
        }
    }

    /// Raw argument at `index`
    pub fn argument(&self, index: usize) -> Result<&str, FilterError> {
        self.arguments
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| FilterError::MissingArgument {
                function: self.function.clone(),
                index,
            })
    }

    pub fn int64_value(&self, index: usize) -> Result<i64, FilterError> {
        let raw = self.argument(index)?;
        raw.trim().parse().map_err(|_| self.invalid(raw, "integer"))
    }

    /// Accepts `true`/`false` in any case, plus `1`/`0`
    pub fn bool_value(&self, index: usize) -> Result<bool, FilterError> {
        let raw = self.argument(index)?;
        match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "1" => Ok(true),
            "false" | "f" | "0" => Ok(false),
            _ => Err(self.invalid(raw, "boolean")),
        }
    }

    /// Human duration such as `24h` or `7days`
    pub fn duration_value(&self, index: usize) -> Result<TimeDelta, FilterError> {
        let raw = self.argument(index)?;
        humantime::parse_duration(raw.trim())
            .ok()
            .and_then(|d| TimeDelta::from_std(d).ok())
            .ok_or_else(|| self.invalid(raw, "duration"))
    }

    /// True if any argument equals `value`
    pub fn any_argument_is(&self, value: &str) -> bool {
        self.arguments.iter().any(|a| a == value)
    }

    pub fn unknown(&self) -> FilterError {
        FilterError::UnknownFunction(self.function.clone())
    }

    fn invalid(&self, value: &str, expected: &'static str) -> FilterError {
        FilterError::InvalidArgument {
            function: self.function.clone(),
            value: value.to_string(),
            expected,
        }
    }
}

/// Filters that must all match, keyed by a descriptive name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterGroup(pub BTreeMap<String, Filter>);

impl FilterGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, filter: Filter) -> Self {
        self.0.insert(name.into(), filter);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn filters(&self) -> impl Iterator<Item = &Filter> {
        self.0.values()
    }
}

/// A resource kind's full filter configuration
pub type FilterGroups = BTreeMap<String, FilterGroup>;

/// Anything a [`Filter`] can be evaluated against
pub trait Filterable {
    /// Evaluate one filter. `now` anchors age comparisons.
    fn filter(&self, filter: &Filter, now: DateTime<Utc>) -> Result<bool, FilterError>;
}

/// AND over a group's filters, short-circuiting on the first non-match.
pub fn match_group<R: Filterable + ?Sized>(
    resource: &R,
    group: &FilterGroup,
    now: DateTime<Utc>,
) -> bool {
    group.filters().all(|filter| match resource.filter(filter, now) {
        Ok(matched) => matched,
        Err(e @ FilterError::UnknownFunction(_)) => {
            warn!(error = %e, "Unknown filter function, treating as non-match");
            false
        }
        Err(e) => {
            debug!(error = %e, "Filter could not be evaluated");
            false
        }
    })
}

/// Outcome of matching a resource against a kind's configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigMatch {
    pub matched: bool,
    /// Every group the resource satisfied
    pub groups: Vec<String>,
}

/// OR over groups. A configuration with no non-empty group matches
/// everything; otherwise empty groups are ignored.
pub fn match_config<R: Filterable + ?Sized>(
    resource: &R,
    groups: &FilterGroups,
    now: DateTime<Utc>,
) -> ConfigMatch {
    if groups.values().all(FilterGroup::is_empty) {
        return ConfigMatch {
            matched: true,
            groups: Vec::new(),
        };
    }

    let matched_groups: Vec<String> = groups
        .iter()
        .filter(|(_, group)| !group.is_empty())
        .filter(|(_, group)| match_group(resource, group, now))
        .map(|(name, _)| name.clone())
        .collect();

    ConfigMatch {
        matched: !matched_groups.is_empty(),
        groups: matched_groups,
    }
}

/// A discovered resource as the filter pipeline sees it
pub trait Candidate: Filterable + fmt::Display {
    /// Protected by another resource
    fn is_dependency(&self) -> bool;

    fn is_whitelisted(&self, whitelist_tag: &str) -> bool;
}

impl Candidate for Resource {
    fn is_dependency(&self) -> bool {
        self.dependency
    }

    /// A resource carrying `whitelist_tag`, with any value, is never reaped.
    fn is_whitelisted(&self, whitelist_tag: &str) -> bool {
        self.tagged(whitelist_tag)
    }
}

/// Where the filter engine placed one resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Matched and not whitelisted; carries the matched group names
    Reapable { groups: Vec<String> },
    NotMatched,
    /// Protected by another resource
    Dependency,
    /// Carries the whitelist tag
    Whitelisted,
    /// A filter panicked
    Failed,
}

impl Verdict {
    pub fn is_reapable(&self) -> bool {
        matches!(self, Verdict::Reapable { .. })
    }
}

/// Run the full filter pipeline for one resource.
///
/// Dependencies are excluded before any filter runs. The whitelist check
/// runs after group matching and overrides it.
pub fn evaluate<R: Candidate + ?Sized>(
    resource: &R,
    groups: &FilterGroups,
    whitelist_tag: &str,
    now: DateTime<Utc>,
) -> Verdict {
    if resource.is_dependency() {
        return Verdict::Dependency;
    }

    let outcome = catch_unwind(AssertUnwindSafe(|| match_config(resource, groups, now)));
    let config_match = match outcome {
        Ok(m) => m,
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(
                resource = %resource,
                reason = %reason,
                "Recovered from panic while filtering resource"
            );
            return Verdict::Failed;
        }
    };

    if resource.is_whitelisted(whitelist_tag) {
        return Verdict::Whitelisted;
    }

    if config_match.matched {
        Verdict::Reapable {
            groups: config_match.groups,
        }
    } else {
        Verdict::NotMatched
    }
}
