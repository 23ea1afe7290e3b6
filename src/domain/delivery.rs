//! Delivery history domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Terminal status of one dispatch attempt.
///
/// `Blocked` is set by an external policy layer (reputation/spam filtering);
/// the orchestrator records it via pass-through, never decides it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Sent,
    Failed,
    Blocked,
}

/// Append-only record of one dispatch outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryLogEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub status: DeliveryStatus,
    pub connection_id: String,
    pub message_id: Option<String>,
}

impl DeliveryLogEntry {
    pub fn new(
        status: DeliveryStatus,
        connection_id: impl Into<String>,
        message_id: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            status,
            connection_id: connection_id.into(),
            message_id,
        }
    }
}

/// Outcome counts over a time window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryStats {
    pub sent: u64,
    pub failed: u64,
    pub blocked: u64,
}

impl DeliveryStats {
    pub fn total(&self) -> u64 {
        self.sent + self.failed + self.blocked
    }

    pub fn tally(&mut self, status: DeliveryStatus) {
        match status {
            DeliveryStatus::Sent => self.sent += 1,
            DeliveryStatus::Failed => self.failed += 1,
            DeliveryStatus::Blocked => self.blocked += 1,
        }
    }
}
