use chrono::{DateTime, NaiveTime, Utc};
use foldwatch_types::{ProjectId, WorkUnitResult};
use serde::{Deserialize, Serialize};

/// What a raw log line turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLineKind {
    /// Log restart marker; begins a new client run.
    LogOpen,
    ClientVersion,
    ClientArguments,
    /// Work-unit start carrying the project 4-tuple.
    ProjectStart,
    FrameCompleted,
    CoreVersion,
    /// Core shutdown line carrying the unit result.
    CoreShutdown,
    FinalCreditEstimate,
    Paused,
    Resumed,
    Error,
    /// Client-reported completed count across all runs.
    LifetimeUnits,
    /// Not classifiable; ignored downstream.
    Unknown,
}

/// Frame-completion payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameData {
    pub slot: u32,
    pub unit: u32,
    /// Frame index, i.e. the reported percentage for 100-frame cores.
    pub frame_id: u32,
    pub steps_done: u64,
    pub steps_total: u64,
}

/// Parsed payload of a classified line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LogLineData {
    None,
    /// Absolute restart time, when the marker carried one.
    LogOpen { started_at: Option<DateTime<Utc>> },
    ClientVersion { version: String },
    ClientArguments { arguments: String },
    ProjectStart {
        slot: u32,
        unit: u32,
        project: ProjectId,
    },
    Frame(FrameData),
    CoreVersion {
        slot: u32,
        unit: u32,
        version: String,
    },
    CoreShutdown {
        slot: u32,
        unit: u32,
        result: WorkUnitResult,
    },
    FinalCreditEstimate {
        slot: u32,
        unit: u32,
        points: f64,
    },
    Paused { slot: u32 },
    Resumed { slot: u32 },
    Error { text: String },
    LifetimeUnits { count: u32 },
}

/// One classified log line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogLine {
    /// Zero-based position in the source text.
    pub index: usize,
    /// Time-of-day stamp the client wrote, if the line carried one.
    /// Client logs carry no date component; the run anchor supplies it.
    pub time_of_day: Option<NaiveTime>,
    pub kind: LogLineKind,
    pub data: LogLineData,
    pub raw: String,
}

impl LogLine {
    pub fn unknown(index: usize, raw: &str) -> Self {
        Self {
            index,
            time_of_day: None,
            kind: LogLineKind::Unknown,
            data: LogLineData::None,
            raw: raw.to_string(),
        }
    }

    /// (slot, unit) pair for lines scoped to one work unit.
    pub fn unit_id(&self) -> Option<(u32, u32)> {
        match &self.data {
            LogLineData::ProjectStart { slot, unit, .. }
            | LogLineData::CoreVersion { slot, unit, .. }
            | LogLineData::CoreShutdown { slot, unit, .. }
            | LogLineData::FinalCreditEstimate { slot, unit, .. } => Some((*slot, *unit)),
            LogLineData::Frame(frame) => Some((frame.slot, frame.unit)),
            _ => None,
        }
    }
}
