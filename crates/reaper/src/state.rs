//! Reaper lifecycle state machine
//!
//! A resource that keeps matching the reap filters escalates through
//! `Ignore → First → Second → Third → Final`, one step per due cycle.
//! An owner may snooze it back to `Ignore` at any point; once the snooze
//! elapses, escalation restarts at `First` rather than at the stage the
//! resource was snoozed from.
//!
//! ## Serialized form
//!
//! ```text
//! STAGE|since|until
//! ```
//!
//! `STAGE` is one of `IGNORE`, `SNOOZED`, `FIRST`, `SECOND`, `THIRD`, `FINAL`
//! (`SNOOZED` is an `Ignore` set by an owner), and `since`/`until` are unix
//! seconds. The same string is stored in the `REAPER` tag and in the state
//! file.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use reaper_common::whole_seconds;
use tracing::warn;

use crate::error::ReaperError;

/// Escalation stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Ignore,
    First,
    Second,
    Third,
    Final,
}

impl Stage {
    /// Canonical upper-case name, as matched by the `ReaperState` filter
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Ignore => "IGNORE",
            Stage::First => "FIRST",
            Stage::Second => "SECOND",
            Stage::Third => "THIRD",
            Stage::Final => "FINAL",
        }
    }

    /// The stage a due resource moves to, `None` for `Final`
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Ignore => Some(Stage::First),
            Stage::First => Some(Stage::Second),
            Stage::Second => Some(Stage::Third),
            Stage::Third => Some(Stage::Final),
            Stage::Final => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How long a resource stays in each notification stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageDurations {
    pub first: Duration,
    pub second: Duration,
    pub third: Duration,
}

impl StageDurations {
    /// Time to spend in `stage` after entering it
    pub fn for_stage(&self, stage: Stage) -> Duration {
        match stage {
            Stage::First => self.first,
            Stage::Second => self.second,
            Stage::Third => self.third,
            Stage::Ignore | Stage::Final => Duration::ZERO,
        }
    }
}

impl Default for StageDurations {
    fn default() -> Self {
        use reaper_common::defaults::{
            DEFAULT_FIRST_STAGE, DEFAULT_SECOND_STAGE, DEFAULT_THIRD_STAGE,
        };
        Self {
            first: DEFAULT_FIRST_STAGE,
            second: DEFAULT_SECOND_STAGE,
            third: DEFAULT_THIRD_STAGE,
        }
    }
}

/// A resource's position in the escalation lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaperState {
    stage: Stage,
    /// Set only for an `Ignore` entered through an owner action
    snoozed: bool,
    since: DateTime<Utc>,
    until: DateTime<Utc>,
}

impl ReaperState {
    /// Initial state for a newly seen resource: `Ignore`, already due.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            stage: Stage::Ignore,
            snoozed: false,
            since: whole_seconds(now),
            until: DateTime::UNIX_EPOCH,
        }
    }

    /// Restore from a serialized tag value, falling back to a fresh state.
    pub fn from_tag_or_new(tag: Option<&str>, now: DateTime<Utc>) -> Self {
        match tag {
            Some(value) => value.parse().unwrap_or_else(|e: ReaperError| {
                warn!(error = %e, "Discarding unreadable reaper state tag");
                Self::new(now)
            }),
            None => Self::new(now),
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// True when the state is an owner-requested `Ignore`
    pub fn is_snoozed(&self) -> bool {
        self.snoozed
    }

    /// When the current stage was entered
    pub fn since(&self) -> DateTime<Utc> {
        self.since
    }

    /// When the current stage becomes eligible to advance
    pub fn until(&self) -> DateTime<Utc> {
        self.until
    }

    /// Move to the next stage if `now` is past `until`.
    ///
    /// Returns whether a transition happened. `Final` never advances, and a
    /// `now` that is not later than `until` never changes anything, so the
    /// state is monotonic under repeated calls.
    pub fn advance_if_due(&mut self, now: DateTime<Utc>, durations: &StageDurations) -> bool {
        let Some(next) = self.stage.next() else {
            return false;
        };
        if now <= self.until {
            return false;
        }

        let entered = whole_seconds(now);
        self.stage = next;
        self.snoozed = false;
        self.since = entered;
        self.until = add_duration(entered, durations.for_stage(next));
        true
    }

    /// Snooze the resource: `Ignore` until `now + duration`.
    ///
    /// Escalation restarts at `First` once the snooze elapses; the stage the
    /// resource was in before is not remembered.
    pub fn set_ignore(&mut self, duration: Duration, now: DateTime<Utc>) {
        let entered = whole_seconds(now);
        self.stage = Stage::Ignore;
        self.snoozed = true;
        self.since = entered;
        self.until = add_duration(entered, duration);
    }

    /// Serialize to the compact `STAGE|since|until` form
    pub fn serialize(&self) -> String {
        self.to_string()
    }

    /// Parse the compact form produced by [`ReaperState::serialize`]
    pub fn deserialize(input: &str) -> Result<Self, ReaperError> {
        input.parse()
    }

    fn stage_token(&self) -> &'static str {
        if self.snoozed {
            SNOOZED
        } else {
            self.stage.as_str()
        }
    }
}

const SNOOZED: &str = "SNOOZED";

fn add_duration(start: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(duration)
        .ok()
        .and_then(|delta| start.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

impl fmt::Display for ReaperState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}",
            self.stage_token(),
            self.since.timestamp(),
            self.until.timestamp()
        )
    }
}

impl FromStr for ReaperState {
    type Err = ReaperError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = input.trim().split('|').collect();
        let [stage, since, until] = fields.as_slice() else {
            return Err(ReaperError::malformed_state(
                input,
                format!("expected 3 '|'-separated fields, got {}", fields.len()),
            ));
        };

        let (stage, snoozed) = match *stage {
            "IGNORE" => (Stage::Ignore, false),
            SNOOZED => (Stage::Ignore, true),
            "FIRST" => (Stage::First, false),
            "SECOND" => (Stage::Second, false),
            "THIRD" => (Stage::Third, false),
            "FINAL" => (Stage::Final, false),
            other => {
                return Err(ReaperError::malformed_state(
                    input,
                    format!("unknown stage '{other}'"),
                ));
            }
        };

        Ok(Self {
            stage,
            snoozed,
            since: parse_timestamp(input, since)?,
            until: parse_timestamp(input, until)?,
        })
    }
}

fn parse_timestamp(input: &str, field: &str) -> Result<DateTime<Utc>, ReaperError> {
    field
        .parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .ok_or_else(|| ReaperError::malformed_state(input, format!("bad timestamp '{field}'")))
}
