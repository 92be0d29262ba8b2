//! Notification delivery

use std::future::Future;

use anyhow::Result;
use tracing::info;

use super::{ReapEvent, Statistic};

/// Delivers reap events and statistics.
///
/// Delivery failures are reported to the caller, which logs them; they never
/// abort a reap cycle.
pub trait Notifier: Send + Sync + 'static {
    /// Deliver a rendered batch or individual event
    fn notify(&self, event: &ReapEvent) -> impl Future<Output = Result<()>> + Send;

    /// Emit one statistic
    fn statistic(&self, stat: &Statistic) -> impl Future<Output = Result<()>> + Send;
}

/// Notifier that writes events and statistics to the log
#[derive(Debug, Clone)]
pub struct TracingNotifier {
    whitelist_tag: String,
}

impl TracingNotifier {
    pub fn new(whitelist_tag: impl Into<String>) -> Self {
        Self {
            whitelist_tag: whitelist_tag.into(),
        }
    }
}

impl Notifier for TracingNotifier {
    async fn notify(&self, event: &ReapEvent) -> Result<()> {
        info!(
            recipient = event.recipient().unwrap_or("<unowned>"),
            subject = %event.subject(),
            resources = event.items().len(),
            "Reap event\n{}",
            event.render_text(&self.whitelist_tag)
        );
        Ok(())
    }

    async fn statistic(&self, stat: &Statistic) -> Result<()> {
        info!(
            name = %stat.name,
            value = stat.value,
            tags = %stat.tags.join(","),
            "Statistic"
        );
        Ok(())
    }
}
