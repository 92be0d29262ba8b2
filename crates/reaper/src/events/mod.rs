//! Notification events and statistics
//!
//! The reap loop produces one [`ReapEvent`] per owner batch or individual
//! resource, each item carrying signed [`ActionLinks`], and a stream of
//! [`Statistic`]s. A [`Notifier`] delivers both.

mod notifier;

use std::fmt::Write as _;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reaper_common::ResourceKind;
use reaper_common::defaults::IGNORE_LINK_DAYS;
use url::Url;

pub use notifier::{Notifier, TracingNotifier};

use crate::error::ReaperError;
use crate::resource::Resource;
use crate::token::{Action, LinkSigner};

/// A named metric sample
#[derive(Debug, Clone, PartialEq)]
pub struct Statistic {
    pub name: String,
    pub value: f64,
    pub tags: Vec<String>,
}

impl Statistic {
    pub fn new(name: impl Into<String>, value: f64, tags: Vec<String>) -> Self {
        Self {
            name: name.into(),
            value,
            tags,
        }
    }
}

/// Signed links offered with every reapable resource
#[derive(Debug, Clone, PartialEq)]
pub struct ActionLinks {
    pub terminate: Url,
    pub stop: Url,
    pub force_stop: Url,
    pub whitelist: Url,
    /// `(days, link)` for each offered snooze length
    pub ignore: Vec<(u64, Url)>,
}

impl ActionLinks {
    pub fn new(
        signer: &LinkSigner,
        region: &str,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<Self, ReaperError> {
        let link = |action| signer.make_link(action, region, id, now);
        let ignore = IGNORE_LINK_DAYS
            .iter()
            .map(|&days| {
                let action = Action::ignore_for(Duration::from_secs(days * 86_400));
                link(action).map(|url| (days, url))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            terminate: link(Action::Terminate)?,
            stop: link(Action::Stop)?,
            force_stop: link(Action::ForceStop)?,
            whitelist: link(Action::Whitelist)?,
            ignore,
        })
    }
}

/// One resource in an event
#[derive(Debug, Clone)]
pub struct EventItem {
    pub resource: Resource,
    pub links: ActionLinks,
}

impl EventItem {
    fn render(&self, out: &mut String, whitelist_tag: &str) {
        let r = &self.resource;
        let stop_label = match r.kind() {
            ResourceKind::AutoScalingGroup => "Scale to 0",
            _ => "Stop",
        };

        let _ = writeln!(out, "{r} is scheduled to be terminated.");
        let _ = writeln!(
            out,
            "  State: {} (advances after {})",
            r.reaper_state.stage(),
            r.reaper_state.until().to_rfc3339()
        );
        if !r.matched_filter_groups.is_empty() {
            let groups: Vec<&str> = r.matched_filter_groups.keys().map(String::as_str).collect();
            let _ = writeln!(out, "  Matched: {}", groups.join(", "));
        }
        let _ = writeln!(out, "  Terminate now: {}", self.links.terminate);
        let _ = writeln!(out, "  {stop_label}: {}", self.links.stop);
        let _ = writeln!(out, "  Force stop: {}", self.links.force_stop);
        for (days, link) in &self.links.ignore {
            let plural = if *days == 1 { "" } else { "s" };
            let _ = writeln!(out, "  Ignore for {days} day{plural}: {link}");
        }
        let _ = writeln!(
            out,
            "  Whitelist (or tag it with {whitelist_tag}): {}",
            self.links.whitelist
        );
    }
}

/// A notification about one or more reapable resources
#[derive(Debug, Clone)]
pub enum ReapEvent {
    /// An unowned resource, or an owner's only reapable one
    Single {
        recipient: Option<String>,
        item: EventItem,
    },
    /// Every reapable resource of one owner
    Batch { owner: String, items: Vec<EventItem> },
}

impl ReapEvent {
    pub fn recipient(&self) -> Option<&str> {
        match self {
            ReapEvent::Single { recipient, .. } => recipient.as_deref(),
            ReapEvent::Batch { owner, .. } => Some(owner),
        }
    }

    pub fn items(&self) -> &[EventItem] {
        match self {
            ReapEvent::Single { item, .. } => std::slice::from_ref(item),
            ReapEvent::Batch { items, .. } => items,
        }
    }

    pub fn subject(&self) -> String {
        match self {
            ReapEvent::Single { item, .. } => {
                let r = &item.resource;
                format!(
                    "{} {} in {} is going to be reaped",
                    r.kind().display_name(),
                    r.id,
                    r.region
                )
            }
            ReapEvent::Batch { items, .. } => {
                format!("{} of your resources are going to be reaped", items.len())
            }
        }
    }

    /// Plain-text body listing every item with its links
    pub fn render_text(&self, whitelist_tag: &str) -> String {
        let mut out = String::new();
        match self {
            ReapEvent::Single { item, .. } => {
                out.push_str("Reaper has discovered a resource qualified as reapable.\n\n");
                item.render(&mut out, whitelist_tag);
            }
            ReapEvent::Batch { owner, items } => {
                let _ = writeln!(
                    out,
                    "Reaper has discovered {} resources owned by {owner} qualified as reapable.",
                    items.len()
                );
                for item in items {
                    out.push('\n');
                    item.render(&mut out, whitelist_tag);
                }
            }
        }
        out.push_str("\nIf you take no action these resources will be terminated.\n");
        out
    }
}
