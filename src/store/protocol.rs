//! Wire messages between a [`RemoteStore`](super::RemoteStore) and the
//! relay, framed as newline-delimited JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request from a store client. `id` correlates the reply; `sub` names a
/// client-chosen subscription slot for snapshot routing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientRequest {
    /// One-shot read of `path`.
    Read {
        /// Correlation id echoed in the reply.
        id: u64,
        /// Target path.
        path: String,
    },
    /// Replace the value at `path`.
    Write {
        /// Correlation id echoed in the reply.
        id: u64,
        /// Target path.
        path: String,
        /// New value.
        value: Value,
    },
    /// Merge `fields` into the object at `path`.
    Update {
        /// Correlation id echoed in the reply.
        id: u64,
        /// Target path.
        path: String,
        /// Fields to merge.
        fields: serde_json::Map<String, Value>,
    },
    /// Delete the value at `path`.
    Remove {
        /// Correlation id echoed in the reply.
        id: u64,
        /// Target path.
        path: String,
    },
    /// Start streaming snapshots of `path` on subscription slot `sub`.
    Subscribe {
        /// Correlation id echoed in the reply.
        id: u64,
        /// Client-chosen subscription slot.
        sub: u64,
        /// Target path.
        path: String,
    },
    /// Stop streaming snapshots for slot `sub`.
    Unsubscribe {
        /// Correlation id echoed in the reply.
        id: u64,
        /// Subscription slot to release.
        sub: u64,
    },
}

impl ClientRequest {
    /// The correlation id carried by this request.
    pub fn id(&self) -> u64 {
        match self {
            Self::Read { id, .. }
            | Self::Write { id, .. }
            | Self::Update { id, .. }
            | Self::Remove { id, .. }
            | Self::Subscribe { id, .. }
            | Self::Unsubscribe { id, .. } => *id,
        }
    }
}

/// Message from the relay to a store client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Mutation or subscription request succeeded.
    Ack {
        /// Correlation id of the acknowledged request.
        id: u64,
    },
    /// Reply to a read.
    Value {
        /// Correlation id of the read.
        id: u64,
        /// Value at the path, `None` if absent.
        value: Option<Value>,
    },
    /// Request failed.
    Error {
        /// Correlation id of the failed request.
        id: u64,
        /// Failure description.
        message: String,
    },
    /// Snapshot delivery for a subscription slot. The first snapshot for a
    /// slot is the value at subscribe time.
    Snapshot {
        /// Subscription slot this snapshot belongs to.
        sub: u64,
        /// Current value of the subscribed subtree.
        value: Option<Value>,
    },
}
