use chrono::{DateTime, Utc};
use foldwatch_types::{ProjectId, WorkUnitResult};
use serde::{Deserialize, Serialize};

/// Flattened, persisted form of a terminal work unit.
///
/// Stored columns plus protein metadata captured at insert time. The
/// `credit` and `ppd` fields are not stored; they are computed after fetch
/// against the production view the caller selected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub project: ProjectId,
    pub client_name: String,
    pub client_path: String,
    pub username: Option<String>,
    pub team: Option<i64>,
    pub core_version: Option<String>,
    pub frames_completed: i64,
    /// Duration of one frame in seconds at completion time.
    pub frame_time_secs: i64,
    pub result: WorkUnitResult,
    /// Download time. Unknown when the log never captured the assignment,
    /// which happens for units already running when logging began.
    pub assigned: Option<DateTime<Utc>>,
    pub finished: Option<DateTime<Utc>>,

    // Protein metadata captured at insert time.
    pub work_unit_name: Option<String>,
    pub k_factor: Option<f64>,
    pub core_name: Option<String>,
    pub frames: Option<i64>,
    pub atoms: Option<i64>,
    pub base_credit: Option<f64>,
    pub preferred_days: Option<f64>,
    pub maximum_days: Option<f64>,

    // Derived production columns, view-dependent, filled at query time.
    #[serde(default)]
    pub credit: f64,
    #[serde(default)]
    pub ppd: f64,
}

/// One page of history results plus the unpaged total.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryPage {
    pub entries: Vec<HistoryEntry>,
    pub total_count: usize,
    pub page: usize,
    pub page_size: usize,
}

impl HistoryPage {
    pub fn page_count(&self) -> usize {
        if self.page_size == 0 {
            return 0;
        }
        self.total_count.div_ceil(self.page_size)
    }
}
