use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::ProjectId;

/// Final (or current) disposition of a work unit as reported by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkUnitResult {
    #[default]
    Unknown,
    FinishedUnit,
    EarlyUnitEnd,
    Interrupted,
    BadWorkUnit,
    CoreOutdated,
    UnstableMachine,
    InProgress,
}

impl WorkUnitResult {
    /// Terminal results are eligible for history insertion: the unit either
    /// finished or failed in a way the core will not retry.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkUnitResult::FinishedUnit
                | WorkUnitResult::EarlyUnitEnd
                | WorkUnitResult::BadWorkUnit
                | WorkUnitResult::CoreOutdated
                | WorkUnitResult::UnstableMachine
        )
    }
}

/// One observed frame-completion checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameObservation {
    /// Frame index (0-100 for percentage-based cores).
    pub id: u32,
    /// When the frame completion was logged.
    pub timestamp: DateTime<Utc>,
    /// Duration since the previous frame, if one was observed.
    pub duration: Option<chrono::Duration>,
}

/// One reconstructed work unit, merged from a queue entry and its log lines.
///
/// Uniquely identified by (project 4-tuple, assigned time, owning client) for
/// de-duplication in the history store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkUnit {
    pub project: ProjectId,
    /// Queue slot index this unit occupies.
    pub slot_index: u32,
    /// When the unit was downloaded from the assignment server.
    pub assigned: Option<DateTime<Utc>>,
    /// Deadline after which the unit is discarded server-side.
    pub timeout: Option<DateTime<Utc>>,
    /// Completion time. When the remote log omits one for a finished unit
    /// this is the aggregator's own capture time, which makes wall-clock
    /// production figures for that unit slightly imprecise. Long-standing
    /// behavior; historical rows already carry the same skew.
    pub finished: Option<DateTime<Utc>>,
    pub result: WorkUnitResult,
    /// Observed frame completions keyed by frame id.
    pub frames: BTreeMap<u32, FrameObservation>,
    /// Total frames the unit will report when complete.
    pub frames_expected: u32,
    /// When the core logged the unit start, if seen in this run.
    pub unit_start: Option<DateTime<Utc>>,
    pub core_id: Option<String>,
    pub core_version: Option<String>,
    pub username: Option<String>,
    pub team: Option<u32>,
    pub client_name: String,
    pub client_path: String,
}

impl WorkUnit {
    pub fn new(project: ProjectId, slot_index: u32, client_name: &str, client_path: &str) -> Self {
        Self {
            project,
            slot_index,
            assigned: None,
            timeout: None,
            finished: None,
            result: WorkUnitResult::Unknown,
            frames: BTreeMap::new(),
            frames_expected: 0,
            unit_start: None,
            core_id: None,
            core_version: None,
            username: None,
            team: None,
            client_name: client_name.to_string(),
            client_path: client_path.to_string(),
        }
    }

    pub fn frames_completed(&self) -> u32 {
        self.frames.len() as u32
    }

    /// Most recent frame observation, by log order.
    pub fn last_frame(&self) -> Option<&FrameObservation> {
        self.frames.values().max_by_key(|f| f.timestamp)
    }

    /// Duration of the most recent frame that carried one, in seconds.
    pub fn frame_time_secs(&self) -> Option<i64> {
        self.last_frame()
            .and_then(|f| f.duration)
            .map(|d| d.num_seconds())
    }

    /// De-duplication identity check: same task assigned to the same client
    /// at the same moment.
    pub fn same_unit(&self, other: &WorkUnit) -> bool {
        self.project == other.project
            && self.assigned == other.assigned
            && self.client_name == other.client_name
            && self.client_path == other.client_path
    }
}

/// Aggregated counters for one client run (since last client restart).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRunSnapshot {
    pub completed_units: u32,
    pub failed_units: u32,
    /// Completed count across all runs, as reported by the client itself.
    pub total_completed_units: Option<u32>,
    pub client_version: Option<String>,
    pub arguments: Option<String>,
}
