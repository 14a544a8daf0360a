//! Store adapter for the external realtime key/value service.
//!
//! The game core never talks to a concrete backend; it writes and observes
//! JSON values at hierarchical `/`-separated paths through the [`Store`]
//! trait. Two writers racing on overlapping fields resolve last-write-wins
//! in whatever order the backend applies them; the core's transitions are
//! designed to tolerate that (see [`crate::machine`]).

use async_trait::async_trait;
use derive_more::{Display, Error};
use serde_json::Value;
use tokio::sync::mpsc;

mod memory;
mod protocol;
mod remote;

pub use memory::MemoryStore;
pub use protocol::{ClientRequest, ServerMessage};
pub use remote::RemoteStore;

/// The underlying store operation failed (I/O, connection lost).
///
/// This is the only error the core surfaces to the user; precondition
/// violations are silent no-ops.
#[derive(Debug, Clone, Display, Error)]
#[display("store unavailable: {message}")]
pub struct StoreError {
    /// Human-readable description of the failure.
    pub message: String,
}

impl StoreError {
    /// Creates a new store error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A live subscription to one path.
///
/// The first delivery is the full value at subscribe time; every subsequent
/// delivery follows a change anywhere in the subscribed subtree. `None`
/// means the path holds no value (absent or removed). Deliveries arrive in
/// a monotonically non-decreasing order for this observer. Dropping the
/// subscription stops delivery.
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<Option<Value>>,
}

impl Subscription {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<Option<Value>>) -> Self {
        Self { rx }
    }

    /// Waits for the next snapshot. Returns `None` once the store side has
    /// gone away and no further deliveries will arrive.
    pub async fn next(&mut self) -> Option<Option<Value>> {
        self.rx.recv().await
    }
}

/// Contract every store backend implements.
///
/// Paths are hierarchical `/`-separated keys (`sessions/<id>/players/<pid>`).
/// No multi-path transaction is available; multi-step state changes are
/// independent writes and observers may see intermediate states.
#[async_trait]
pub trait Store: Send + Sync {
    /// One-shot read of the value at `path`, `None` if absent.
    async fn read_once(&self, path: &str) -> Result<Option<Value>, StoreError>;

    /// Replaces the value at `path`, creating intermediate nodes as needed.
    async fn write(&self, path: &str, value: Value) -> Result<(), StoreError>;

    /// Merges `fields` into the object at `path`, leaving siblings
    /// untouched. A `null` field value is stored as JSON `null` (reads back
    /// as an absent optional).
    async fn update(
        &self,
        path: &str,
        fields: serde_json::Map<String, Value>,
    ) -> Result<(), StoreError>;

    /// Deletes the value at `path` and everything nested under it.
    /// Removing an absent path is not an error.
    async fn remove(&self, path: &str) -> Result<(), StoreError>;

    /// Subscribes to `path`; the current value is delivered immediately.
    async fn subscribe(&self, path: &str) -> Result<Subscription, StoreError>;
}
