use chrono::{DateTime, Duration, NaiveTime, Utc};
use foldwatch_types::{ClientRunSnapshot, ProjectId};

use crate::line::{LogLine, LogLineData, LogLineKind};

/// One client run: everything logged between two restart markers.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientRun {
    /// Absolute restart time, when the log-open marker carried one.
    pub started_at: Option<DateTime<Utc>>,
    /// Counters and metadata extracted from this run's lines.
    pub snapshot: ClientRunSnapshot,
    pub lines: Vec<LogLine>,
}

impl ClientRun {
    fn from_lines(started_at: Option<DateTime<Utc>>, lines: Vec<LogLine>) -> Self {
        let mut snapshot = ClientRunSnapshot::default();

        for line in &lines {
            match &line.data {
                LogLineData::ClientVersion { version } => {
                    snapshot.client_version = Some(version.clone());
                }
                LogLineData::ClientArguments { arguments } => {
                    snapshot.arguments = Some(arguments.clone());
                }
                LogLineData::CoreShutdown { result, .. } => {
                    if *result == foldwatch_types::WorkUnitResult::FinishedUnit {
                        snapshot.completed_units += 1;
                    } else {
                        snapshot.failed_units += 1;
                    }
                }
                // The client restates its lifetime total; the last report wins.
                LogLineData::LifetimeUnits { count } => {
                    snapshot.total_completed_units = Some(*count);
                }
                _ => {}
            }
        }

        Self {
            started_at,
            snapshot,
            lines,
        }
    }
}

/// Partition classified lines into per-restart runs.
///
/// A run begins at each `LogOpen` marker. Lines before the first marker form
/// a headless run (log rotation can drop the marker), anchored only by the
/// caller's capture time.
pub fn partition_runs(lines: Vec<LogLine>) -> Vec<ClientRun> {
    let mut runs = Vec::new();
    let mut current: Vec<LogLine> = Vec::new();
    let mut current_start: Option<DateTime<Utc>> = None;

    for line in lines {
        if line.kind == LogLineKind::LogOpen {
            if !current.is_empty() {
                runs.push(ClientRun::from_lines(current_start, std::mem::take(&mut current)));
            }
            current_start = match &line.data {
                LogLineData::LogOpen { started_at } => *started_at,
                _ => None,
            };
            current.push(line);
        } else {
            current.push(line);
        }
    }

    if !current.is_empty() {
        runs.push(ClientRun::from_lines(current_start, current));
    }

    runs
}

/// Locate the log subsequence for one queue entry by matching its project
/// 4-tuple, most recent occurrence first.
///
/// Returns the anchor project-start line and every following line scoped to
/// the same (slot, unit) id, up to (but excluding) the next start of that
/// unit id. `None` when the entry has not started logging yet.
pub fn unit_subsequence<'a>(run: &'a ClientRun, project: &ProjectId) -> Option<Vec<&'a LogLine>> {
    let anchor_pos = run.lines.iter().rposition(|line| {
        matches!(&line.data, LogLineData::ProjectStart { project: p, .. } if p == project)
    })?;

    let unit_id = run.lines[anchor_pos].unit_id()?;
    let mut subsequence = vec![&run.lines[anchor_pos]];

    for line in &run.lines[anchor_pos + 1..] {
        if line.kind == LogLineKind::ProjectStart && line.unit_id() == Some(unit_id) {
            break;
        }
        if line.unit_id() == Some(unit_id) {
            subsequence.push(line);
        }
    }

    Some(subsequence)
}

/// Turns per-line time-of-day stamps into absolute timestamps.
///
/// The client writes no date component, so the anchor date comes from the
/// run's log-open marker (or the caller's capture time). A decreasing
/// time-of-day means the log crossed local midnight and advances the day.
#[derive(Debug)]
pub struct TimestampResolver {
    current_day: DateTime<Utc>,
    previous: Option<NaiveTime>,
}

impl TimestampResolver {
    pub fn new(anchor: DateTime<Utc>) -> Self {
        let midnight = anchor
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|naive| naive.and_utc())
            .unwrap_or(anchor);

        Self {
            current_day: midnight,
            previous: None,
        }
    }

    pub fn resolve(&mut self, time_of_day: NaiveTime) -> DateTime<Utc> {
        if let Some(previous) = self.previous
            && time_of_day < previous
        {
            self.current_day += Duration::days(1);
        }
        self.previous = Some(time_of_day);

        self.current_day + (time_of_day - NaiveTime::from_hms_opt(0, 0, 0).unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify_text;
    use chrono::TimeZone;

    const TWO_RUN_LOG: &str = "\
*********************** Log Started 2024-01-10T08:00:00Z ***********************
08:00:01:Version: 7.6.21
08:00:01:Arguments: --config /etc/fah/config.xml
08:00:02:+ Number of Units Completed: 188
08:00:05:WU00:FS00:0xa7:Project: 9000 (Run 1, Clone 2, Gen 3)
08:30:05:WU00:FS00:0xa7:Completed 250000 out of 25000000 steps (1%)
09:00:05:WU00:FS00:0xa7:Folding@home Core Shutdown: FINISHED_UNIT
*********************** Log Started 2024-01-11T06:00:00Z ***********************
06:00:01:Version: 7.6.21
06:00:05:WU01:FS00:0xa7:Project: 9999 (Run 0, Clone 0, Gen 0)
06:05:05:WU01:FS00:0xa7:Completed 250000 out of 25000000 steps (1%)
06:10:05:WU01:FS00:0xa7:Completed 500000 out of 25000000 steps (2%)
06:11:00:WU01:FS00:0xa7:Folding@home Core Shutdown: INTERRUPTED
";

    #[test]
    fn test_partition_two_runs() {
        let runs = partition_runs(classify_text(TWO_RUN_LOG));
        assert_eq!(runs.len(), 2);

        assert_eq!(runs[0].snapshot.completed_units, 1);
        assert_eq!(runs[0].snapshot.failed_units, 0);
        assert_eq!(runs[0].snapshot.total_completed_units, Some(188));
        assert_eq!(
            runs[0].snapshot.arguments.as_deref(),
            Some("--config /etc/fah/config.xml")
        );

        assert_eq!(runs[1].snapshot.completed_units, 0);
        assert_eq!(runs[1].snapshot.failed_units, 1);
        // The second run never restated the lifetime total.
        assert_eq!(runs[1].snapshot.total_completed_units, None);
        assert_eq!(runs[1].snapshot.client_version.as_deref(), Some("7.6.21"));
        assert!(runs[1].started_at.is_some());
    }

    #[test]
    fn test_headless_run() {
        let runs = partition_runs(classify_text(
            "08:00:05:WU00:FS00:0xa7:Project: 9000 (Run 1, Clone 2, Gen 3)\n",
        ));
        assert_eq!(runs.len(), 1);
        assert!(runs[0].started_at.is_none());
    }

    #[test]
    fn test_unit_subsequence_matches_project() {
        let runs = partition_runs(classify_text(TWO_RUN_LOG));
        let run = &runs[1];

        let lines = unit_subsequence(run, &ProjectId::new(9999, 0, 0, 0)).unwrap();
        // anchor + 2 frames + shutdown
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0].kind, LogLineKind::ProjectStart);
        assert_eq!(lines[3].kind, LogLineKind::CoreShutdown);
    }

    #[test]
    fn test_unit_subsequence_missing_project() {
        let runs = partition_runs(classify_text(TWO_RUN_LOG));
        assert!(unit_subsequence(&runs[1], &ProjectId::new(1234, 0, 0, 0)).is_none());
    }

    #[test]
    fn test_unit_subsequence_stops_at_next_start() {
        let text = "\
06:00:05:WU01:FS00:0xa7:Project: 9999 (Run 0, Clone 0, Gen 0)
06:05:05:WU01:FS00:0xa7:Completed 250000 out of 25000000 steps (1%)
06:11:00:WU01:FS00:0xa7:Folding@home Core Shutdown: FINISHED_UNIT
06:12:00:WU01:FS00:0xa7:Project: 8888 (Run 0, Clone 0, Gen 0)
06:20:00:WU01:FS00:0xa7:Completed 250000 out of 25000000 steps (1%)
";
        let runs = partition_runs(classify_text(text));
        let lines = unit_subsequence(&runs[0], &ProjectId::new(9999, 0, 0, 0)).unwrap();
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_timestamp_resolver_day_rollover() {
        let anchor = Utc.with_ymd_and_hms(2024, 1, 10, 23, 0, 0).unwrap();
        let mut resolver = TimestampResolver::new(anchor);

        let late = resolver.resolve(NaiveTime::from_hms_opt(23, 50, 0).unwrap());
        let early = resolver.resolve(NaiveTime::from_hms_opt(0, 10, 0).unwrap());

        assert_eq!(late, Utc.with_ymd_and_hms(2024, 1, 10, 23, 50, 0).unwrap());
        assert_eq!(early, Utc.with_ymd_and_hms(2024, 1, 11, 0, 10, 0).unwrap());
    }
}
