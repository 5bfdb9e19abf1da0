use chrono::{DateTime, Utc};
use foldwatch_logs::{ClientRun, LogLine, LogLineData, TimestampResolver, unit_subsequence};
use foldwatch_types::{
    ClientRunSnapshot, FrameObservation, QueueEntry, QueueSnapshot, WorkUnit, WorkUnitResult,
};
use std::collections::BTreeMap;
use tracing::warn;

/// Per-poll inputs that are not part of the log or queue themselves.
#[derive(Debug, Clone)]
pub struct AggregationContext {
    pub client_name: String,
    pub client_path: String,
    /// When this poll captured its artifacts. Also the stand-in finish time
    /// for terminal units whose log omitted one, so aggregation over
    /// identical inputs with the same capture time is fully reproducible.
    pub capture_time: DateTime<Utc>,
}

/// Aggregation output: one work unit per queue entry that has started
/// logging, plus the live current index and run metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotUnits {
    pub units: BTreeMap<u32, WorkUnit>,
    /// Queue index the client reports as running; never inferred from logs.
    pub current: Option<u32>,
    pub run: ClientRunSnapshot,
    /// Non-fatal problems encountered while merging; aggregation always
    /// continues past them.
    pub warnings: Vec<String>,
}

impl SlotUnits {
    pub fn current_unit(&self) -> Option<&WorkUnit> {
        self.current.and_then(|index| self.units.get(&index))
    }

    /// True when the set of (index, project, assigned) triples differs,
    /// i.e. the slot composition changed since the previous poll.
    pub fn composition_differs(&self, other: &SlotUnits) -> bool {
        if self.units.len() != other.units.len() {
            return true;
        }
        self.units.iter().zip(other.units.iter()).any(
            |((index_a, unit_a), (index_b, unit_b))| {
                index_a != index_b || !unit_a.same_unit(unit_b)
            },
        )
    }
}

/// Reconcile a client's queue snapshot with the active run's log lines.
///
/// Queue entries whose project 4-tuple has no matching log subsequence are
/// skipped (they have not started logging). Individual line problems are
/// collected as warnings and never abort the remaining entries.
pub fn aggregate(run: &ClientRun, queue: &QueueSnapshot, ctx: &AggregationContext) -> SlotUnits {
    let mut units = BTreeMap::new();
    let mut warnings = Vec::new();

    for entry in &queue.entries {
        if entry.project.is_unknown() {
            continue;
        }

        let Some(lines) = unit_subsequence(run, &entry.project) else {
            continue;
        };

        let unit = build_unit(run, entry, &lines, ctx, &mut warnings);
        units.insert(entry.index, unit);
    }

    SlotUnits {
        units,
        current: queue.running_index(),
        run: run.snapshot.clone(),
        warnings,
    }
}

fn build_unit(
    run: &ClientRun,
    entry: &QueueEntry,
    lines: &[&LogLine],
    ctx: &AggregationContext,
    warnings: &mut Vec<String>,
) -> WorkUnit {
    let mut unit = WorkUnit::new(entry.project, entry.index, &ctx.client_name, &ctx.client_path);
    unit.assigned = entry.assigned;
    unit.timeout = entry.timeout;
    unit.core_id = entry.core_id.clone();
    unit.username = entry.username.clone();
    unit.team = entry.team;
    unit.result = WorkUnitResult::InProgress;

    let anchor = run.started_at.unwrap_or(ctx.capture_time);
    let mut resolver = TimestampResolver::new(anchor);
    let mut previous_frame: Option<DateTime<Utc>> = None;

    for line in lines {
        let timestamp = line.time_of_day.map(|tod| resolver.resolve(tod));

        match &line.data {
            LogLineData::ProjectStart { .. } => {
                unit.unit_start = timestamp;
            }
            LogLineData::Frame(frame) => {
                let Some(timestamp) = timestamp else {
                    warnings.push(format!(
                        "{}: frame line {} has no timestamp; skipped",
                        entry.project, line.index
                    ));
                    continue;
                };

                if frame.steps_total > 0 {
                    // Percent-based cores checkpoint once per percent.
                    unit.frames_expected = 100;
                }

                let duration = previous_frame.map(|prev| timestamp - prev);
                previous_frame = Some(timestamp);

                if unit
                    .frames
                    .insert(
                        frame.frame_id,
                        FrameObservation {
                            id: frame.frame_id,
                            timestamp,
                            duration,
                        },
                    )
                    .is_some()
                {
                    warnings.push(format!(
                        "{}: frame {} observed twice; keeping the later observation",
                        entry.project, frame.frame_id
                    ));
                }
            }
            LogLineData::CoreVersion { version, .. } => {
                unit.core_version = Some(version.clone());
            }
            LogLineData::CoreShutdown { result, .. } => {
                unit.result = *result;
                if result.is_terminal() {
                    unit.finished = timestamp;
                }
            }
            LogLineData::FinalCreditEstimate { .. } => {}
            _ => {}
        }
    }

    // The remote protocol does not always supply a finish timestamp; stamp
    // with our own capture time rather than dropping the unit. Documented
    // imprecision in wall-clock production figures.
    if unit.result.is_terminal() && unit.finished.is_none() {
        warn!(project = %unit.project, "terminal unit without log finish time; using capture time");
        unit.finished = Some(ctx.capture_time);
    }

    unit
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use foldwatch_logs::{classify_text, partition_runs};
    use foldwatch_types::{ProjectId, QueueEntryStatus};

    const RUN_LOG: &str = "\
*********************** Log Started 2024-01-10T08:00:00Z ***********************
08:00:01:Version: 7.6.21
08:00:05:WU00:FS00:0xa7:Project: 9999 (Run 0, Clone 0, Gen 0)
08:00:06:WU00:FS00:0xa7:Version: 0.0.11
08:05:05:WU00:FS00:0xa7:Completed 250000 out of 25000000 steps (1%)
08:10:05:WU00:FS00:0xa7:Completed 500000 out of 25000000 steps (2%)
08:15:05:WU00:FS00:0xa7:Completed 750000 out of 25000000 steps (3%)
";

    fn context() -> AggregationContext {
        AggregationContext {
            client_name: "rig".to_string(),
            client_path: "/var/lib/fah".to_string(),
            capture_time: Utc.with_ymd_and_hms(2024, 1, 10, 8, 20, 0).unwrap(),
        }
    }

    fn queue_with_running(project: ProjectId) -> QueueSnapshot {
        let mut entry = QueueEntry::new(0, project);
        entry.status = QueueEntryStatus::Running;
        entry.assigned = Some(Utc.with_ymd_and_hms(2024, 1, 10, 7, 59, 0).unwrap());
        entry.username = Some("anonymous".to_string());
        entry.team = Some(224497);
        QueueSnapshot {
            entries: vec![entry],
        }
    }

    fn active_run(text: &str) -> ClientRun {
        partition_runs(classify_text(text)).pop().unwrap()
    }

    #[test]
    fn test_aggregate_merges_queue_and_log() {
        let run = active_run(RUN_LOG);
        let queue = queue_with_running(ProjectId::new(9999, 0, 0, 0));
        let result = aggregate(&run, &queue, &context());

        assert_eq!(result.units.len(), 1);
        assert_eq!(result.current, Some(0));

        let unit = result.current_unit().unwrap();
        assert_eq!(unit.frames_completed(), 3);
        assert_eq!(unit.result, WorkUnitResult::InProgress);
        assert_eq!(unit.core_version.as_deref(), Some("0.0.11"));
        assert_eq!(unit.username.as_deref(), Some("anonymous"));
        assert_eq!(unit.frame_time_secs(), Some(300));
        assert!(unit.unit_start.is_some());
        assert!(unit.assigned.is_some());
    }

    #[test]
    fn test_first_frame_has_no_duration() {
        let run = active_run(RUN_LOG);
        let queue = queue_with_running(ProjectId::new(9999, 0, 0, 0));
        let result = aggregate(&run, &queue, &context());

        let unit = result.current_unit().unwrap();
        assert!(unit.frames[&1].duration.is_none());
        assert_eq!(
            unit.frames[&2].duration,
            Some(chrono::Duration::seconds(300))
        );
    }

    #[test]
    fn test_entry_not_logging_yet_is_skipped() {
        let run = active_run(RUN_LOG);
        let mut queue = queue_with_running(ProjectId::new(9999, 0, 0, 0));
        queue
            .entries
            .push(QueueEntry::new(1, ProjectId::new(7777, 1, 1, 1)));

        let result = aggregate(&run, &queue, &context());
        assert_eq!(result.units.len(), 1);
        assert!(!result.units.contains_key(&1));
    }

    #[test]
    fn test_no_running_entry_means_no_current() {
        let run = active_run(RUN_LOG);
        let mut queue = queue_with_running(ProjectId::new(9999, 0, 0, 0));
        queue.entries[0].status = QueueEntryStatus::Ready;

        let result = aggregate(&run, &queue, &context());
        assert_eq!(result.current, None);
        // The unit itself is still aggregated.
        assert_eq!(result.units.len(), 1);
    }

    #[test]
    fn test_finished_unit_takes_log_finish_time() {
        let text = format!(
            "{}08:20:00:WU00:FS00:0xa7:Folding@home Core Shutdown: FINISHED_UNIT\n",
            RUN_LOG
        );
        let run = active_run(&text);
        let queue = queue_with_running(ProjectId::new(9999, 0, 0, 0));
        let result = aggregate(&run, &queue, &context());

        let unit = &result.units[&0];
        assert_eq!(unit.result, WorkUnitResult::FinishedUnit);
        assert_eq!(
            unit.finished,
            Some(Utc.with_ymd_and_hms(2024, 1, 10, 8, 20, 0).unwrap())
        );
    }

    #[test]
    fn test_aggregation_is_idempotent() {
        let run = active_run(RUN_LOG);
        let queue = queue_with_running(ProjectId::new(9999, 0, 0, 0));
        let ctx = context();

        let first = aggregate(&run, &queue, &ctx);
        let second = aggregate(&run, &queue, &ctx);
        assert_eq!(first, second);

        let a = serde_json::to_vec(&first.units).unwrap();
        let b = serde_json::to_vec(&second.units).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_duplicate_frame_recorded_as_warning() {
        let text = format!(
            "{}08:16:05:WU00:FS00:0xa7:Completed 750000 out of 25000000 steps (3%)\n",
            RUN_LOG
        );
        let run = active_run(&text);
        let queue = queue_with_running(ProjectId::new(9999, 0, 0, 0));
        let result = aggregate(&run, &queue, &context());

        assert_eq!(result.warnings.len(), 1);
        let unit = &result.units[&0];
        assert_eq!(unit.frames_completed(), 3);
    }

    #[test]
    fn test_composition_differs() {
        let run = active_run(RUN_LOG);
        let queue = queue_with_running(ProjectId::new(9999, 0, 0, 0));
        let ctx = context();

        let a = aggregate(&run, &queue, &ctx);
        let b = aggregate(&run, &queue, &ctx);
        assert!(!a.composition_differs(&b));

        let mut other_queue = queue.clone();
        other_queue.entries[0].project = ProjectId::new(8888, 0, 0, 0);
        let text = RUN_LOG.replace("Project: 9999 (Run 0, Clone 0, Gen 0)", "Project: 8888 (Run 0, Clone 0, Gen 0)");
        let other_run = active_run(&text);
        let c = aggregate(&other_run, &other_queue, &ctx);
        assert!(a.composition_differs(&c));
    }
}
