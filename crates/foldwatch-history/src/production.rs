use foldwatch_types::Protein;
use serde::{Deserialize, Serialize};

use crate::entry::HistoryEntry;

/// Basis for computing derived PPD/credit columns from a stored row.
///
/// A user-facing toggle, not an implementation detail: the same row yields
/// different numbers per view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProductionView {
    /// Unit time = frame time x frame count (steady-state cadence).
    #[default]
    FrameTime,
    /// Unit time = wall clock from download to completion.
    EffectiveRate,
}

/// Fill the view-dependent `credit` and `ppd` columns of a fetched entry.
///
/// Runs in the application after fetch; the storage layer carries no scalar
/// functions or business logic.
pub fn apply_view(entry: &mut HistoryEntry, view: ProductionView) {
    let elapsed_secs = match view {
        ProductionView::FrameTime => {
            let frames = entry.frames.unwrap_or(100).max(1);
            (entry.frame_time_secs * frames) as f64
        }
        ProductionView::EffectiveRate => match (entry.assigned, entry.finished) {
            (Some(assigned), Some(finished)) => (finished - assigned).num_seconds() as f64,
            _ => 0.0,
        },
    };

    if elapsed_secs <= 0.0 {
        entry.credit = entry.base_credit.unwrap_or(0.0);
        entry.ppd = 0.0;
        return;
    }

    let protein = protein_from_entry(entry);
    entry.credit = protein.credit_for(elapsed_secs);
    entry.ppd = protein.ppd(elapsed_secs);
}

fn protein_from_entry(entry: &HistoryEntry) -> Protein {
    let mut protein = Protein::new(entry.project.project);
    protein.credit = entry.base_credit.unwrap_or(0.0);
    protein.frames = entry.frames.unwrap_or(100).max(1) as u32;
    protein.k_factor = entry.k_factor.unwrap_or(0.0);
    protein.preferred_days = entry.preferred_days.unwrap_or(0.0);
    protein.maximum_days = entry.maximum_days.unwrap_or(0.0);
    protein
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use foldwatch_types::{ProjectId, WorkUnitResult};

    fn entry() -> HistoryEntry {
        HistoryEntry {
            id: 1,
            project: ProjectId::new(9999, 0, 0, 0),
            client_name: "rig".to_string(),
            client_path: "/var/lib/fah".to_string(),
            username: Some("user".to_string()),
            team: Some(32),
            core_version: Some("0.0.11".to_string()),
            frames_completed: 100,
            frame_time_secs: 300,
            result: WorkUnitResult::FinishedUnit,
            assigned: Some(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()),
            // Wall clock 12h; frame basis is 300 x 100 = 30000s (8h20m).
            finished: Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()),
            work_unit_name: Some("p9999_lambda".to_string()),
            k_factor: Some(2.0),
            core_name: Some("GRO_A7".to_string()),
            frames: Some(100),
            atoms: Some(250_000),
            base_credit: Some(1000.0),
            preferred_days: Some(2.0),
            maximum_days: Some(4.0),
            credit: 0.0,
            ppd: 0.0,
        }
    }

    #[test]
    fn test_views_disagree_for_same_row() {
        let mut frame_view = entry();
        apply_view(&mut frame_view, ProductionView::FrameTime);

        let mut wall_view = entry();
        apply_view(&mut wall_view, ProductionView::EffectiveRate);

        assert!(frame_view.ppd > 0.0);
        assert!(wall_view.ppd > 0.0);
        // Frame basis (30000s) is faster than wall clock (43200s), so both
        // the bonus and the per-day rate are higher.
        assert!(frame_view.ppd > wall_view.ppd);
        assert!(frame_view.credit > wall_view.credit);
    }

    #[test]
    fn test_no_finish_time_zeroes_effective_rate() {
        let mut e = entry();
        e.finished = None;
        apply_view(&mut e, ProductionView::EffectiveRate);
        assert_eq!(e.ppd, 0.0);
    }

    #[test]
    fn test_no_download_time_zeroes_effective_rate() {
        let mut e = entry();
        e.assigned = None;
        apply_view(&mut e, ProductionView::EffectiveRate);
        assert_eq!(e.ppd, 0.0);
        // Frame basis does not need the download time.
        apply_view(&mut e, ProductionView::FrameTime);
        assert!(e.ppd > 0.0);
    }

    #[test]
    fn test_no_k_factor_means_base_credit() {
        let mut e = entry();
        e.k_factor = Some(0.0);
        apply_view(&mut e, ProductionView::FrameTime);
        assert_eq!(e.credit, 1000.0);
    }
}
