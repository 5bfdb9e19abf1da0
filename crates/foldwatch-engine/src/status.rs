use chrono::{DateTime, Duration, NaiveTime, Timelike, Utc};
use foldwatch_types::{SlotKind, SlotStatus, StatusSnapshot};

// Grace window before a silent slot counts as hung, in frame times.
// GPU frames are far less frequent, so the window is much longer.
const CPU_DEADLINE_FRAMES: i64 = 2;
const GPU_DEADLINE_FRAMES: i64 = 7;

// Synthesized frame times for the first poll after a unit start, before any
// frame has completed.
const CPU_BASE_FRAME_SECS: i64 = 3600;
const GPU_BASE_FRAME_SECS: i64 = 600;

/// Map a snapshot of timing facts to a health classification.
///
/// Pure and deterministic: identical snapshots always classify identically.
/// Strict frame-cadence classification is the default; the progress-based
/// async fallback is an explicit opt-in relaxation for configurations that
/// report frames far less often than the nominal cadence.
pub fn determine(snapshot: &StatusSnapshot) -> SlotStatus {
    // Explicit remote-reported states are never second-guessed.
    if snapshot.reported_status.is_explicit() {
        return snapshot.reported_status;
    }

    // Unknown is terminal for the heuristics as well: no inference attempted.
    if snapshot.reported_status == SlotStatus::Unknown {
        return SlotStatus::Unknown;
    }

    match (snapshot.frame_time_secs, snapshot.last_frame_time) {
        (Some(frame_time), Some(last_frame)) => {
            let deadline = terminal_deadline(snapshot, frame_time);
            if adjusted_frame_date(snapshot, last_frame) > deadline {
                SlotStatus::Running
            } else {
                async_fallback(snapshot, frame_time)
            }
        }
        _ => no_frame_time_path(snapshot),
    }
}

/// First poll since the unit started: no measured frame time yet. Use the
/// benchmark average when one exists, otherwise a synthesized base frame
/// time, and judge against the unit start timestamp instead of a frame.
fn no_frame_time_path(snapshot: &StatusSnapshot) -> SlotStatus {
    let base_frame_time = snapshot
        .benchmark_average_secs
        .unwrap_or(match snapshot.slot_kind {
            SlotKind::Cpu => CPU_BASE_FRAME_SECS,
            SlotKind::Gpu => GPU_BASE_FRAME_SECS,
        });

    let deadline = terminal_deadline(snapshot, base_frame_time);
    match snapshot.unit_start_time {
        Some(start) if start > deadline => SlotStatus::RunningNoFrameTimes,
        Some(_) => async_fallback(snapshot, base_frame_time),
        // No timing facts at all: nothing to infer from.
        None => SlotStatus::Unknown,
    }
}

/// Hung, unless the caller allows progress-based re-evaluation and the later
/// of (unit start, last frame progress) beats the same deadline.
fn async_fallback(snapshot: &StatusSnapshot, frame_time: i64) -> SlotStatus {
    if !snapshot.allow_running_async {
        return SlotStatus::Hung;
    }

    let basis = match (snapshot.unit_start_time, snapshot.last_progress_time) {
        (Some(start), Some(progress)) => Some(start.max(progress)),
        (Some(start), None) => Some(start),
        (None, Some(progress)) => Some(progress),
        (None, None) => None,
    };

    match basis {
        Some(basis) if basis > terminal_deadline(snapshot, frame_time) => SlotStatus::RunningAsync,
        _ => SlotStatus::Hung,
    }
}

fn terminal_deadline(snapshot: &StatusSnapshot, frame_time: i64) -> DateTime<Utc> {
    let frames = match snapshot.slot_kind {
        SlotKind::Cpu => CPU_DEADLINE_FRAMES,
        SlotKind::Gpu => GPU_DEADLINE_FRAMES,
    };
    snapshot.retrieval_time - Duration::seconds(frame_time * frames)
}

/// Reconstruct an absolute date for the last frame event from its
/// time-of-day component.
///
/// The machine UTC offset is added (unless declared irrelevant), the
/// configured client clock offset subtracted, and the result normalized into
/// [0, 24h). A normalized time-of-day more than one hour ahead of the
/// retrieval time-of-day belongs to the previous calendar day: the client
/// crossed local midnight between the frame and the poll.
fn adjusted_frame_date(snapshot: &StatusSnapshot, event: DateTime<Utc>) -> DateTime<Utc> {
    let mut secs = event.num_seconds_from_midnight() as i64;
    if !snapshot.ignore_utc_offset {
        secs += snapshot.utc_offset_secs;
    }
    secs -= snapshot.clock_offset_minutes * 60;
    let normalized = secs.rem_euclid(86_400);

    let retrieval_tod = snapshot.retrieval_time.num_seconds_from_midnight() as i64;
    let mut date = snapshot.retrieval_time.date_naive();
    if normalized > retrieval_tod + 3600 {
        date = date.pred_opt().unwrap_or(date);
    }

    let time = NaiveTime::from_num_seconds_from_midnight_opt(normalized as u32, 0)
        .unwrap_or(NaiveTime::MIN);
    date.and_time(time).and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn snapshot_at(retrieval: DateTime<Utc>, kind: SlotKind) -> StatusSnapshot {
        let mut snapshot = StatusSnapshot::new(retrieval, kind);
        snapshot.reported_status = SlotStatus::Running;
        snapshot
    }

    fn t(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, h, m, s).unwrap()
    }

    #[test]
    fn test_explicit_status_passthrough() {
        for status in [
            SlotStatus::Offline,
            SlotStatus::Stopped,
            SlotStatus::EuePause,
            SlotStatus::Hung,
            SlotStatus::Paused,
            SlotStatus::SendingWorkPacket,
            SlotStatus::GettingWorkPacket,
        ] {
            let mut snapshot = snapshot_at(t(12, 0, 0), SlotKind::Cpu);
            snapshot.reported_status = status;
            assert_eq!(determine(&snapshot), status);
        }
    }

    #[test]
    fn test_unknown_short_circuits() {
        let mut snapshot = snapshot_at(t(12, 0, 0), SlotKind::Cpu);
        snapshot.reported_status = SlotStatus::Unknown;
        snapshot.frame_time_secs = Some(300);
        snapshot.last_frame_time = Some(t(11, 59, 0));
        assert_eq!(determine(&snapshot), SlotStatus::Unknown);
    }

    #[test]
    fn test_cpu_within_deadline_is_running() {
        // Deadline is retrieval - 2x300s = 600s ago; frame 400s ago beats it.
        let mut snapshot = snapshot_at(t(12, 0, 0), SlotKind::Cpu);
        snapshot.frame_time_secs = Some(300);
        snapshot.last_frame_time = Some(t(11, 53, 20));
        assert_eq!(determine(&snapshot), SlotStatus::Running);
    }

    #[test]
    fn test_cpu_past_deadline_is_hung() {
        // Frame 700s ago, deadline 600s ago.
        let mut snapshot = snapshot_at(t(12, 0, 0), SlotKind::Cpu);
        snapshot.frame_time_secs = Some(300);
        snapshot.last_frame_time = Some(t(11, 48, 20));
        assert_eq!(determine(&snapshot), SlotStatus::Hung);
    }

    #[test]
    fn test_gpu_grace_window_is_longer() {
        // 500s ago would hang a CPU slot with 7x shorter grace, but a GPU
        // slot gets 7x300s = 2100s.
        let mut snapshot = snapshot_at(t(12, 0, 0), SlotKind::Gpu);
        snapshot.frame_time_secs = Some(300);
        snapshot.last_frame_time = Some(t(11, 51, 40));
        assert_eq!(determine(&snapshot), SlotStatus::Running);
    }

    #[test]
    fn test_determinism() {
        let mut snapshot = snapshot_at(t(12, 0, 0), SlotKind::Cpu);
        snapshot.frame_time_secs = Some(300);
        snapshot.last_frame_time = Some(t(11, 53, 20));
        let first = determine(&snapshot);
        for _ in 0..10 {
            assert_eq!(determine(&snapshot), first);
        }
    }

    #[test]
    fn test_midnight_rollover() {
        // Last frame at 23:50, retrieval 00:10 the next day. The adjusted
        // frame date must roll back one calendar day instead of registering
        // as later today.
        let retrieval = Utc.with_ymd_and_hms(2024, 3, 16, 0, 10, 0).unwrap();
        let frame = Utc.with_ymd_and_hms(2024, 3, 15, 23, 50, 0).unwrap();

        let snapshot = snapshot_at(retrieval, SlotKind::Cpu);
        let adjusted = adjusted_frame_date(&snapshot, frame);
        assert_eq!(adjusted, Utc.with_ymd_and_hms(2024, 3, 15, 23, 50, 0).unwrap());

        // CPU, 300s frames: deadline is 00:00, so 23:50 yesterday is hung.
        let mut cpu = snapshot_at(retrieval, SlotKind::Cpu);
        cpu.frame_time_secs = Some(300);
        cpu.last_frame_time = Some(frame);
        assert_eq!(determine(&cpu), SlotStatus::Hung);

        // GPU, 300s frames: deadline is 23:35 yesterday, so 23:50 runs.
        let mut gpu = snapshot_at(retrieval, SlotKind::Gpu);
        gpu.frame_time_secs = Some(300);
        gpu.last_frame_time = Some(frame);
        assert_eq!(determine(&gpu), SlotStatus::Running);
    }

    #[test]
    fn test_clock_offset_applied() {
        // Client clock runs 30 minutes fast; subtracting the offset pulls
        // the frame back past the deadline.
        let mut snapshot = snapshot_at(t(12, 0, 0), SlotKind::Cpu);
        snapshot.frame_time_secs = Some(300);
        snapshot.last_frame_time = Some(t(11, 55, 0));
        assert_eq!(determine(&snapshot), SlotStatus::Running);

        snapshot.clock_offset_minutes = 30;
        assert_eq!(determine(&snapshot), SlotStatus::Hung);
    }

    #[test]
    fn test_utc_offset_respected_and_ignorable() {
        // Log times are written at UTC+1 on the client; adding the offset
        // keeps the frame current.
        let mut snapshot = snapshot_at(t(12, 0, 0), SlotKind::Cpu);
        snapshot.frame_time_secs = Some(300);
        snapshot.last_frame_time = Some(t(10, 55, 0));
        snapshot.utc_offset_secs = 3600;
        assert_eq!(determine(&snapshot), SlotStatus::Running);

        snapshot.ignore_utc_offset = true;
        assert_eq!(determine(&snapshot), SlotStatus::Hung);
    }

    #[test]
    fn test_no_frame_time_uses_benchmark_then_base() {
        // Unit started 20 minutes ago, no frames yet.
        let mut snapshot = snapshot_at(t(12, 0, 0), SlotKind::Cpu);
        snapshot.unit_start_time = Some(t(11, 40, 0));

        // Base CPU frame time 3600s: deadline 2h ago, so it still runs.
        assert_eq!(determine(&snapshot), SlotStatus::RunningNoFrameTimes);

        // A 300s benchmark average shrinks the window to 600s: hung.
        snapshot.benchmark_average_secs = Some(300);
        assert_eq!(determine(&snapshot), SlotStatus::Hung);
    }

    #[test]
    fn test_no_timing_facts_is_unknown() {
        let snapshot = snapshot_at(t(12, 0, 0), SlotKind::Cpu);
        assert_eq!(determine(&snapshot), SlotStatus::Unknown);
    }

    #[test]
    fn test_async_fallback_reclassifies_hung() {
        let mut snapshot = snapshot_at(t(12, 0, 0), SlotKind::Cpu);
        snapshot.frame_time_secs = Some(300);
        snapshot.last_frame_time = Some(t(11, 0, 0));
        snapshot.last_progress_time = Some(t(11, 59, 0));
        assert_eq!(determine(&snapshot), SlotStatus::Hung);

        snapshot.allow_running_async = true;
        assert_eq!(determine(&snapshot), SlotStatus::RunningAsync);
    }

    #[test]
    fn test_async_fallback_still_hung_without_progress() {
        let mut snapshot = snapshot_at(t(12, 0, 0), SlotKind::Cpu);
        snapshot.frame_time_secs = Some(300);
        snapshot.last_frame_time = Some(t(11, 0, 0));
        snapshot.last_progress_time = Some(t(11, 30, 0));
        snapshot.unit_start_time = Some(t(10, 0, 0));
        snapshot.allow_running_async = true;
        assert_eq!(determine(&snapshot), SlotStatus::Hung);
    }
}
