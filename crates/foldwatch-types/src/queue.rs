use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ProjectId;

/// Live status of one queue entry as reported by the client.
///
/// This is the transport's word, not an inference from logs; the aggregator
/// trusts it when picking the current entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QueueEntryStatus {
    Empty,
    Ready,
    Running,
    Finished,
    Sent,
    Garbage,
    #[default]
    Unknown,
}

/// One slot of the client's work queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub index: u32,
    pub status: QueueEntryStatus,
    pub project: ProjectId,
    /// When the assignment server handed out this unit.
    pub assigned: Option<DateTime<Utc>>,
    /// Server-side deadline for the unit.
    pub timeout: Option<DateTime<Utc>>,
    pub core_id: Option<String>,
    pub username: Option<String>,
    pub team: Option<u32>,
}

impl QueueEntry {
    pub fn new(index: u32, project: ProjectId) -> Self {
        Self {
            index,
            status: QueueEntryStatus::Unknown,
            project,
            assigned: None,
            timeout: None,
            core_id: None,
            username: None,
            team: None,
        }
    }
}

/// Snapshot of a client's whole queue, delivered as one typed record by the
/// transport collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub entries: Vec<QueueEntry>,
}

impl QueueSnapshot {
    pub fn running_index(&self) -> Option<u32> {
        self.entries
            .iter()
            .find(|e| e.status == QueueEntryStatus::Running)
            .map(|e| e.index)
    }
}
