use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

const DEFAULT_EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheOperation {
    #[display("get")]
    Get,
    #[display("get_with")]
    GetWith,
    #[display("put")]
    Put,
    #[display("put_if_absent")]
    PutIfAbsent,
    #[display("evict")]
    Evict,
    #[display("clear")]
    Clear,
}

/// Emitted once per degrade-to-local decision. The hosting process decides
/// how to surface these; the facade also logs each one through `tracing`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DegradeEvent {
    pub region: String,
    /// Absent for whole-region operations (`clear`).
    pub key: Option<String>,
    pub operation: CacheOperation,
    pub cause: String,
    pub at: DateTime<Utc>,
}

/// Broadcast channel for degrade events, shared by every region facade of one
/// manager. Publishing never blocks and never fails a cache operation, a
/// receiver that lags simply misses events.
pub struct DegradeEventBus {
    tx: broadcast::Sender<DegradeEvent>,
}

impl DegradeEventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DegradeEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: DegradeEvent) {
        // Send only errors when there are no subscribers; that is fine.
        let _ = self.tx.send(event);
    }
}

impl Default for DegradeEventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
