//! reaper-common - Shared types and constants
//!
//! This crate holds the pieces shared by the reaping engine, its binary and
//! the test utilities, without pulling in the async runtime.
//!
//! ## Modules
//!
//! - [`defaults`]: Default configuration values
//! - [`resource_kind`]: The closed set of reapable resource kinds
//! - [`tags`]: Resource tag keys the reaper reads and writes

pub mod defaults;
pub mod resource_kind;
pub mod tags;

// Re-export commonly used types
pub use resource_kind::ResourceKind;

/// Truncate a timestamp to whole seconds.
///
/// Reaper state is persisted with second precision, so every timestamp that
/// ends up in a state goes through here first.
#[inline]
pub fn whole_seconds(time: chrono::DateTime<chrono::Utc>) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::from_timestamp(time.timestamp(), 0).unwrap_or(time)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_whole_seconds_drops_subsecond_part() {
        let t = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        let truncated = whole_seconds(t);
        assert_eq!(truncated.timestamp(), 1_700_000_000);
        assert_eq!(truncated.timestamp_subsec_nanos(), 0);
    }
}
