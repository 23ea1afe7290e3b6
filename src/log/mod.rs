//! Delivery log
//!
//! Append-only record of dispatch outcomes and windowed aggregation into
//! counters. Logging is best-effort at the call site; a failed append must
//! never fail the send it describes.

use crate::domain::{DeliveryLogEntry, DeliveryStats, DeliveryStatus};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeliveryLog: Send + Sync {
    /// Append one outcome record
    async fn record(&self, entry: DeliveryLogEntry) -> Result<()>;

    /// Entries whose timestamp falls in `[from, to)`, oldest first
    async fn entries_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<DeliveryLogEntry>>;

    /// Sent/failed/blocked counters over `[from, to)`
    async fn stats_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<DeliveryStats>;
}

/// In-memory append-only delivery log.
pub struct InMemoryDeliveryLog {
    entries: RwLock<Vec<DeliveryLogEntry>>,
}

impl InMemoryDeliveryLog {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryDeliveryLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeliveryLog for InMemoryDeliveryLog {
    async fn record(&self, entry: DeliveryLogEntry) -> Result<()> {
        self.entries.write().await.push(entry);
        Ok(())
    }

    async fn entries_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<DeliveryLogEntry>> {
        let entries = self.entries.read().await;
        let mut selected: Vec<DeliveryLogEntry> = entries
            .iter()
            .filter(|e| e.timestamp >= from && e.timestamp < to)
            .cloned()
            .collect();
        selected.sort_by_key(|e| e.timestamp);
        Ok(selected)
    }

    async fn stats_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<DeliveryStats> {
        let entries = self.entries.read().await;
        let mut stats = DeliveryStats::default();
        for entry in entries.iter() {
            if entry.timestamp >= from && entry.timestamp < to {
                stats.tally(entry.status);
            }
        }
        Ok(stats)
    }
}
