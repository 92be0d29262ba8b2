//! Configuration loading from TOML
//!
//! ```toml
//! whitelist_tag = "REAPER_SPARE_ME"
//! state_file = "/var/lib/reaper/state"
//!
//! [owners]
//! default_email_host = "example.com"
//! default_owner = "cloud-admins@example.com"
//!
//! [http]
//! api_url = "https://reaper.example.com/api"
//! token_secret = "..."
//!
//! [notifications]
//! interval = "6h"
//! first_stage = "1day"
//!
//! [instances]
//! enabled = true
//!
//! [instances.filter_groups.stale]
//! running = { function = "State", arguments = ["running"] }
//! old = { function = "CreatedTimeNotInTheLast", arguments = ["30days"] }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use reaper_common::ResourceKind;
use reaper_common::defaults::{
    DEFAULT_FIRST_STAGE, DEFAULT_INTERVAL, DEFAULT_PRICE_REFRESH, DEFAULT_SECOND_STAGE,
    DEFAULT_THIRD_STAGE, default_action_param, default_event_tag, default_owner_tag,
    default_token_param, default_whitelist_tag,
};
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::filters::FilterGroups;
use crate::inference::OwnershipRules;
use crate::state::StageDurations;
use crate::token::LinkSigner;

/// Configuration validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// http.token_secret is empty
    #[error("http.token_secret cannot be empty")]
    EmptyTokenSecret,

    /// http.api_url does not parse
    #[error("http.api_url '{url}' is not a valid URL: {source}")]
    InvalidApiUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// A scheduling interval is zero
    #[error("{0} must be greater than 0")]
    ZeroInterval(&'static str),

    /// Two query parameters share a name
    #[error("http.action_param and http.token_param must differ")]
    ParamClash,
}

/// Reaper configuration loaded from TOML
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Log mutations instead of performing them
    #[serde(default)]
    pub dry_run: bool,

    /// Tag key that exempts a resource from reaping, whatever its value
    #[serde(default = "default_whitelist_tag")]
    pub whitelist_tag: String,

    /// Tag attached to every statistic
    #[serde(default = "default_event_tag")]
    pub event_tag: String,

    /// Where to write `region,id,state` lines after each cycle
    #[serde(default)]
    pub state_file: Option<PathBuf>,

    /// Restore states from `state_file` at startup
    #[serde(default)]
    pub load_state_file: bool,

    #[serde(default)]
    pub owners: OwnerConfig,

    pub http: HttpConfig,

    #[serde(default)]
    pub notifications: NotificationConfig,

    #[serde(default)]
    pub prices: PriceConfig,

    #[serde(default)]
    pub instances: KindConfig,
    #[serde(default)]
    pub autoscaling_groups: KindConfig,
    #[serde(default)]
    pub security_groups: KindConfig,
    #[serde(default)]
    pub volumes: KindConfig,
    #[serde(default)]
    pub stacks: KindConfig,
}

/// Owner extraction settings
#[derive(Debug, Clone, Deserialize)]
pub struct OwnerConfig {
    /// Tag key naming the owner
    #[serde(default = "default_owner_tag")]
    pub tag: String,
    /// Host appended to bare user names
    #[serde(default)]
    pub default_email_host: Option<String>,
    /// Recipient of individual events for unowned resources
    #[serde(default)]
    pub default_owner: Option<String>,
}

impl Default for OwnerConfig {
    fn default() -> Self {
        Self {
            tag: default_owner_tag(),
            default_email_host: None,
            default_owner: None,
        }
    }
}

/// Action endpoint settings
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Base URL of the action endpoint
    pub api_url: String,
    /// Shared secret for signing action tokens
    pub token_secret: String,
    #[serde(default = "default_action_param")]
    pub action_param: String,
    #[serde(default = "default_token_param")]
    pub token_param: String,
}

/// Scheduling and escalation timing
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    #[serde(default = "default_interval", with = "humantime_duration")]
    pub interval: Duration,
    #[serde(default = "default_first_stage", with = "humantime_duration")]
    pub first_stage: Duration,
    #[serde(default = "default_second_stage", with = "humantime_duration")]
    pub second_stage: Duration,
    #[serde(default = "default_third_stage", with = "humantime_duration")]
    pub third_stage: Duration,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            first_stage: DEFAULT_FIRST_STAGE,
            second_stage: DEFAULT_SECOND_STAGE,
            third_stage: DEFAULT_THIRD_STAGE,
        }
    }
}

/// Pricing feed settings
#[derive(Debug, Clone, Deserialize)]
pub struct PriceConfig {
    #[serde(default = "default_price_refresh", with = "humantime_duration")]
    pub refresh: Duration,
    /// JSON `{region: {instance_type: hourly_price}}` document
    #[serde(default)]
    pub price_file: Option<PathBuf>,
}

impl Default for PriceConfig {
    fn default() -> Self {
        Self {
            refresh: DEFAULT_PRICE_REFRESH,
            price_file: None,
        }
    }
}

/// Per-kind enable flag and filter groups
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KindConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub filter_groups: FilterGroups,
}

fn default_interval() -> Duration {
    DEFAULT_INTERVAL
}

fn default_first_stage() -> Duration {
    DEFAULT_FIRST_STAGE
}

fn default_second_stage() -> Duration {
    DEFAULT_SECOND_STAGE
}

fn default_third_stage() -> Duration {
    DEFAULT_THIRD_STAGE
}

fn default_price_refresh() -> Duration {
    DEFAULT_PRICE_REFRESH
}

impl Config {
    /// Load and validate configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config = Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        Ok(config)
    }

    /// Parse without validating
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Check invariants serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.http.token_secret.is_empty() {
            return Err(ConfigError::EmptyTokenSecret);
        }
        self.api_url()?;
        if self.http.action_param == self.http.token_param {
            return Err(ConfigError::ParamClash);
        }
        if self.notifications.interval.is_zero() {
            return Err(ConfigError::ZeroInterval("notifications.interval"));
        }
        if self.prices.refresh.is_zero() {
            return Err(ConfigError::ZeroInterval("prices.refresh"));
        }
        Ok(())
    }

    pub fn api_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.http.api_url).map_err(|source| ConfigError::InvalidApiUrl {
            url: self.http.api_url.clone(),
            source,
        })
    }

    /// Settings for one resource kind
    pub fn for_kind(&self, kind: ResourceKind) -> &KindConfig {
        match kind {
            ResourceKind::Instance => &self.instances,
            ResourceKind::AutoScalingGroup => &self.autoscaling_groups,
            ResourceKind::SecurityGroup => &self.security_groups,
            ResourceKind::Volume => &self.volumes,
            ResourceKind::Stack => &self.stacks,
        }
    }

    /// Enabled kinds in inference order
    pub fn enabled_kinds(&self) -> Vec<ResourceKind> {
        ResourceKind::ALL
            .into_iter()
            .filter(|kind| self.for_kind(*kind).enabled)
            .collect()
    }

    pub fn stage_durations(&self) -> StageDurations {
        StageDurations {
            first: self.notifications.first_stage,
            second: self.notifications.second_stage,
            third: self.notifications.third_stage,
        }
    }

    pub fn ownership_rules(&self) -> OwnershipRules {
        OwnershipRules {
            owner_tag: self.owners.tag.clone(),
            default_email_host: self.owners.default_email_host.clone(),
        }
    }

    pub fn link_signer(&self) -> Result<LinkSigner, ConfigError> {
        Ok(LinkSigner::new(
            self.http.token_secret.as_bytes(),
            self.api_url()?,
            self.http.action_param.clone(),
            self.http.token_param.clone(),
        ))
    }
}

mod humantime_duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MINIMAL: &str = r#"
        [http]
        api_url = "https://reaper.example.com/api"
        token_secret = "s3cret"
    "#;

    #[test]
    fn test_minimal_config_defaults() {
        let config = Config::from_toml(MINIMAL).unwrap();
        config.validate().unwrap();

        assert!(!config.dry_run);
        assert_eq!(config.whitelist_tag, "REAPER_SPARE_ME");
        assert_eq!(config.owners.tag, "Owner");
        assert_eq!(config.http.action_param, "action");
        assert_eq!(config.notifications.interval, DEFAULT_INTERVAL);
        assert_eq!(config.prices.refresh, DEFAULT_PRICE_REFRESH);
        assert!(config.enabled_kinds().is_empty());
    }

    #[test]
    fn test_load_full_config() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            dry_run = true
            whitelist_tag = "KeepMe"
            state_file = "/tmp/reaper.state"

            [owners]
            default_email_host = "example.com"
            default_owner = "admins@example.com"

            [http]
            api_url = "https://reaper.example.com/api"
            token_secret = "s3cret"

            [notifications]
            interval = "30m"
            first_stage = "2h"
            second_stage = "1day"
            third_stage = "3days"

            [volumes]
            enabled = true

            [instances]
            enabled = true

            [instances.filter_groups.stale]
            running = {{ function = "State", arguments = ["running"] }}
            "#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert!(config.dry_run);
        assert_eq!(config.whitelist_tag, "KeepMe");
        assert_eq!(config.notifications.interval, Duration::from_secs(30 * 60));
        assert_eq!(config.stage_durations().third, Duration::from_secs(3 * 86_400));
        assert_eq!(
            config.enabled_kinds(),
            vec![ResourceKind::Instance, ResourceKind::Volume]
        );
        assert_eq!(config.for_kind(ResourceKind::Instance).filter_groups.len(), 1);
        assert_eq!(
            config.ownership_rules().default_email_host.as_deref(),
            Some("example.com")
        );
    }

    #[test]
    fn test_validation_errors() {
        let mut config = Config::from_toml(MINIMAL).unwrap();
        config.http.token_secret.clear();
        assert!(matches!(config.validate(), Err(ConfigError::EmptyTokenSecret)));

        let mut config = Config::from_toml(MINIMAL).unwrap();
        config.http.api_url = "not a url".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidApiUrl { .. })
        ));

        let mut config = Config::from_toml(MINIMAL).unwrap();
        config.http.token_param = "action".into();
        assert!(matches!(config.validate(), Err(ConfigError::ParamClash)));

        let mut config = Config::from_toml(MINIMAL).unwrap();
        config.notifications.interval = Duration::ZERO;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroInterval(_))));
    }

    #[test]
    fn test_bad_duration_rejected() {
        let err = Config::from_toml(&format!("{MINIMAL}\n[notifications]\ninterval = \"soon\"\n"))
            .unwrap_err();
        assert!(err.to_string().contains("interval") || err.to_string().contains("soon"));
    }

    #[test]
    fn test_missing_file_has_context() {
        let err = Config::load(Path::new("/nonexistent/reaper.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
