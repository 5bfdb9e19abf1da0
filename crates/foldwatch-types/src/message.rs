use serde::{Deserialize, Serialize};

use crate::QueueSnapshot;

/// Typed update messages pushed by the transport collaborator.
///
/// The wire format is the transport's business; by the time a message
/// reaches this crate it is already a typed record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Full log text after a client restart; replaces prior log state.
    LogRestart { text: String },
    /// Incremental log text appended since the last update.
    LogUpdate { text: String },
    QueueUpdate { queue: QueueSnapshot },
    /// Slot composition changed on the client.
    SlotList,
    Options,
    ConnectedChanged { connected: bool },
}
