//! Instance pricing feed
//!
//! Prices only feed the `reaper.instances.totalcost` statistic. The map is
//! refreshed on its own slow schedule and replaced wholesale, so readers
//! grab an `Arc` snapshot and never hold the lock while using it.

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Hourly price by region, then instance type
pub type PricesMap = HashMap<String, HashMap<String, f64>>;

/// Shared, swap-on-refresh price table
#[derive(Clone, Default)]
pub struct PriceBook {
    current: Arc<RwLock<Arc<PricesMap>>>,
}

impl PriceBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current table; cheap to clone and unaffected by later refreshes
    pub fn snapshot(&self) -> Arc<PricesMap> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Replace the whole table
    pub fn replace(&self, prices: PricesMap) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(prices);
    }

    pub fn price(&self, region: &str, instance_type: &str) -> Option<f64> {
        self.snapshot()
            .get(region)
            .and_then(|types| types.get(instance_type))
            .copied()
    }
}

/// Where prices come from
pub trait PriceSource: Send + Sync + 'static {
    fn fetch(&self) -> impl Future<Output = Result<PricesMap>> + Send;
}

/// Prices read from a JSON `{region: {instance_type: price}}` file
#[derive(Debug, Clone)]
pub struct JsonPriceFile {
    path: PathBuf,
}

impl JsonPriceFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl PriceSource for JsonPriceFile {
    async fn fetch(&self) -> Result<PricesMap> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read price file: {}", self.path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse price file: {}", self.path.display()))
    }
}

/// Fetch once and swap the table in; a failed fetch keeps the old table.
pub async fn refresh_prices<S: PriceSource>(book: &PriceBook, source: &S) -> bool {
    match source.fetch().await {
        Ok(prices) => {
            let regions = prices.len();
            book.replace(prices);
            info!(regions, "Refreshed instance prices");
            true
        }
        Err(e) => {
            warn!(error = ?e, "Failed to refresh instance prices, keeping previous table");
            false
        }
    }
}

/// Refresh immediately, then every `every`, until cancelled
pub fn spawn_price_refresh<S: PriceSource>(
    book: PriceBook,
    source: S,
    every: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Price refresh stopped");
                    break;
                }
                _ = ticker.tick() => {
                    refresh_prices(&book, &source).await;
                }
            }
        }
    })
}
