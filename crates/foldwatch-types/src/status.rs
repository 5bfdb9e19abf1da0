use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::SlotKind;

/// Health classification for one client slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    /// No classification possible; logged at error severity and never
    /// refined heuristically.
    #[default]
    Unknown,
    Offline,
    Stopped,
    EuePause,
    Hung,
    Paused,
    SendingWorkPacket,
    GettingWorkPacket,
    RunningNoFrameTimes,
    /// Running, established via progress-based fallback timing rather than
    /// frame cadence.
    RunningAsync,
    Running,
}

impl SlotStatus {
    /// Statuses the heuristic engine passes through unchanged: they were
    /// reported explicitly by the remote client and are not second-guessed.
    pub fn is_explicit(&self) -> bool {
        matches!(
            self,
            SlotStatus::Offline
                | SlotStatus::Stopped
                | SlotStatus::EuePause
                | SlotStatus::Hung
                | SlotStatus::Paused
                | SlotStatus::SendingWorkPacket
                | SlotStatus::GettingWorkPacket
        )
    }

    pub fn is_running(&self) -> bool {
        matches!(
            self,
            SlotStatus::Running | SlotStatus::RunningAsync | SlotStatus::RunningNoFrameTimes
        )
    }
}

/// Ephemeral timing facts fed to the status engine. Recomputed on every
/// poll, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// When the poll that produced this snapshot ran.
    pub retrieval_time: DateTime<Utc>,
    /// Timestamp of the last observed frame completion.
    pub last_frame_time: Option<DateTime<Utc>>,
    /// When the current unit started.
    pub unit_start_time: Option<DateTime<Utc>>,
    /// Last time any frame progress (not necessarily a completion) was seen.
    pub last_progress_time: Option<DateTime<Utc>>,
    /// Status as reported by the client before heuristics run.
    pub reported_status: SlotStatus,
    /// Duration of the most recent frame, seconds.
    pub frame_time_secs: Option<i64>,
    /// Benchmark average frame duration for this (client, project), seconds.
    pub benchmark_average_secs: Option<i64>,
    pub slot_kind: SlotKind,
    /// Corrective clock offset configured for the client, minutes.
    pub clock_offset_minutes: i64,
    /// When set, log times are treated as already being UTC.
    pub ignore_utc_offset: bool,
    /// Machine UTC offset applied to log time-of-day values, seconds.
    pub utc_offset_secs: i64,
    /// Opt-in relaxation: re-evaluate Hung against progress-based timing.
    pub allow_running_async: bool,
}

impl StatusSnapshot {
    pub fn new(retrieval_time: DateTime<Utc>, slot_kind: SlotKind) -> Self {
        Self {
            retrieval_time,
            last_frame_time: None,
            unit_start_time: None,
            last_progress_time: None,
            reported_status: SlotStatus::Unknown,
            frame_time_secs: None,
            benchmark_average_secs: None,
            slot_kind,
            clock_offset_minutes: 0,
            ignore_utc_offset: false,
            utc_offset_secs: 0,
            allow_running_async: false,
        }
    }
}
