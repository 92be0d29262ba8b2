//! Default configuration values
//!
//! These constants keep the binary, the config loader and the tests in
//! agreement about what an unconfigured reaper does.

use std::time::Duration;

/// Default interval between reap cycles (6 hours)
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);

/// Default time a resource spends in the first notification stage (1 day)
pub const DEFAULT_FIRST_STAGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Default time a resource spends in the second notification stage (1 day)
pub const DEFAULT_SECOND_STAGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Default time a resource spends in the third notification stage (1 day)
pub const DEFAULT_THIRD_STAGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Default interval between pricing refreshes (weekly)
pub const DEFAULT_PRICE_REFRESH: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Ignore durations offered in notification links, in days
pub const IGNORE_LINK_DAYS: [u64; 3] = [1, 3, 7];

/// Default query parameter carrying the action name
pub const DEFAULT_ACTION_PARAM: &str = "action";

/// Default query parameter carrying the signed token
pub const DEFAULT_TOKEN_PARAM: &str = "token";

/// Default event tag attached to every statistic
pub const DEFAULT_EVENT_TAG: &str = "reaper";

// Serde default functions for struct field defaults

/// Returns the default action query parameter
pub fn default_action_param() -> String {
    DEFAULT_ACTION_PARAM.to_string()
}

/// Returns the default token query parameter
pub fn default_token_param() -> String {
    DEFAULT_TOKEN_PARAM.to_string()
}

/// Returns the default event tag
pub fn default_event_tag() -> String {
    DEFAULT_EVENT_TAG.to_string()
}

/// Returns the default whitelist tag
pub fn default_whitelist_tag() -> String {
    crate::tags::TAG_WHITELIST.to_string()
}

/// Returns the default owner tag
pub fn default_owner_tag() -> String {
    crate::tags::TAG_OWNER.to_string()
}
