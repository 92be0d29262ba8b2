//! Resource tag keys used by the reaper
//!
//! Tags are the only source of truth for ownership, whitelisting and the
//! provider-side copy of a resource's reaper state.
//!
//! ## Tag Schema
//!
//! | Tag Key | Description |
//! |---------|-------------|
//! | `REAPER` | Serialized lifecycle state (`STAGE\|since\|until`) |
//! | `REAPER_SPARE_ME` | Default whitelist tag (any value) |
//! | `Owner` | Default owner tag (address or bare user name) |
//! | `REAPER_SCALE_DOWN_SCHEDULE` | Cron expression for scheduled scale-down |
//! | `REAPER_SCALE_UP_SCHEDULE` | Cron expression for scheduled scale-up |
//! | `aws:cloudformation:stack-name` | Set by the provider on stack-managed resources |

/// Tag key holding the serialized reaper state
pub const TAG_REAPER_STATE: &str = "REAPER";

/// Default tag key that exempts a resource from reaping
pub const TAG_WHITELIST: &str = "REAPER_SPARE_ME";

/// Default tag key naming a resource's owner
pub const TAG_OWNER: &str = "Owner";

/// Tag key for the scale-down cron expression bound by a schedule action
pub const TAG_SCALE_DOWN_SCHEDULE: &str = "REAPER_SCALE_DOWN_SCHEDULE";

/// Tag key for the scale-up cron expression bound by a schedule action
pub const TAG_SCALE_UP_SCHEDULE: &str = "REAPER_SCALE_UP_SCHEDULE";

/// Tag the provider attaches to every resource created by a stack
pub const TAG_STACK_NAME: &str = "aws:cloudformation:stack-name";

/// Value written to the whitelist tag by the whitelist action
pub const WHITELIST_VALUE: &str = "true";
