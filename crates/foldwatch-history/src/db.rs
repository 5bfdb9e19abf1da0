use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use foldwatch_types::{Protein, ProjectId, WorkUnit, WorkUnitResult};
use rusqlite::{Connection, Row, params};
use tracing::debug;

use crate::entry::{HistoryEntry, HistoryPage};
use crate::error::{Error, Result};
use crate::production::{self, ProductionView};
use crate::query::QueryParameters;
use crate::schema;

/// SQLite-backed archive of completed work units.
///
/// File-backed databases open a fresh connection per operation so the store
/// can be shared across threads without holding SQLite locks between calls;
/// in-memory databases (tests) keep their single connection alive behind a
/// mutex instead, since dropping it would drop the data.
pub struct HistoryDatabase {
    backing: Backing,
}

enum Backing {
    File(PathBuf),
    Memory(Mutex<Connection>),
}

const SELECT_COLUMNS: &str = "id, project, run, clone, gen, client_name, client_path, \
     username, team, core_version, frames_completed, frame_time_secs, result, \
     assigned, finished, work_unit_name, k_factor, core_name, frames, atoms, \
     base_credit, preferred_days, maximum_days";

impl HistoryDatabase {
    /// Open (creating if needed) and migrate a file-backed database.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut conn = Connection::open(&path)?;
        schema::migrate(&mut conn)?;
        Ok(Self {
            backing: Backing::File(path),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        schema::migrate(&mut conn)?;
        Ok(Self {
            backing: Backing::Memory(Mutex::new(conn)),
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        match &self.backing {
            Backing::File(path) => {
                let conn = Connection::open(path)?;
                f(&conn)
            }
            Backing::Memory(conn) => {
                let guard = conn.lock().unwrap_or_else(|err| err.into_inner());
                f(&guard)
            }
        }
    }

    /// Archive one work unit. Returns `Ok(true)` when a row was written,
    /// `Ok(false)` when the unit is not archivable or an identical unit is
    /// already stored. A unit is archivable with a terminal result and a
    /// known assignment time, or with a finished result and a known finish
    /// time when the log never captured the download.
    pub fn insert(&self, unit: &WorkUnit, protein: Option<&Protein>) -> Result<bool> {
        if !unit.result.is_terminal() {
            debug!(project = %unit.project, "skipping non-terminal unit");
            return Ok(false);
        }
        let finished_without_download =
            unit.result == WorkUnitResult::FinishedUnit && unit.finished.is_some();
        if unit.assigned.is_none() && !finished_without_download {
            debug!(project = %unit.project, "skipping unit without assignment time");
            return Ok(false);
        }
        let assigned = unit.assigned.map(|t| t.to_rfc3339());
        let finished = unit.finished.map(|t| t.to_rfc3339());

        self.with_conn(|conn| {
            // Duplicates are keyed on the assignment time when known and on
            // the finish time otherwise.
            let existing: i64 = match &assigned {
                Some(assigned) => conn.query_row(
                    "SELECT COUNT(*) FROM work_unit_history
                     WHERE project = ?1 AND run = ?2 AND clone = ?3 AND gen = ?4
                       AND assigned = ?5 AND client_name = ?6 AND client_path = ?7",
                    params![
                        unit.project.project,
                        unit.project.run,
                        unit.project.clone,
                        unit.project.generation,
                        assigned,
                        unit.client_name,
                        unit.client_path,
                    ],
                    |row| row.get(0),
                )?,
                None => conn.query_row(
                    "SELECT COUNT(*) FROM work_unit_history
                     WHERE project = ?1 AND run = ?2 AND clone = ?3 AND gen = ?4
                       AND assigned IS NULL AND finished IS ?5
                       AND client_name = ?6 AND client_path = ?7",
                    params![
                        unit.project.project,
                        unit.project.run,
                        unit.project.clone,
                        unit.project.generation,
                        finished,
                        unit.client_name,
                        unit.client_path,
                    ],
                    |row| row.get(0),
                )?,
            };
            if existing > 0 {
                debug!(project = %unit.project, "unit already archived");
                return Ok(false);
            }

            conn.execute(
                "INSERT INTO work_unit_history
                 (project, run, clone, gen, client_name, client_path, username, team,
                  core_version, frames_completed, frame_time_secs, result, assigned,
                  finished, work_unit_name, k_factor, core_name, frames, atoms,
                  base_credit, preferred_days, maximum_days)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13,
                         ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22)",
                params![
                    unit.project.project,
                    unit.project.run,
                    unit.project.clone,
                    unit.project.generation,
                    unit.client_name,
                    unit.client_path,
                    unit.username,
                    unit.team,
                    unit.core_version,
                    unit.frames_completed(),
                    unit.frame_time_secs().unwrap_or(0),
                    result_to_str(unit.result),
                    assigned,
                    finished,
                    protein.map(|p| p.work_unit_name.clone()),
                    protein.map(|p| p.k_factor),
                    protein.map(|p| p.core_name.clone()),
                    protein.map(|p| p.frames),
                    protein.map(|p| p.atoms as i64),
                    protein.map(|p| p.credit),
                    protein.map(|p| p.preferred_days),
                    protein.map(|p| p.maximum_days),
                ],
            )?;
            Ok(true)
        })
    }

    /// Delete one row by id. Returns the number of rows removed (0 or 1).
    pub fn delete(&self, id: i64) -> Result<usize> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM work_unit_history WHERE id = ?1", [id])?;
            Ok(deleted)
        })
    }

    pub fn count(&self, query: &QueryParameters) -> Result<usize> {
        self.with_conn(|conn| {
            let (clause, bound) = query.where_clause();
            let sql = if clause.is_empty() {
                "SELECT COUNT(*) FROM work_unit_history".to_string()
            } else {
                format!("SELECT COUNT(*) FROM work_unit_history WHERE {clause}")
            };
            let count: i64 =
                conn.query_row(&sql, rusqlite::params_from_iter(bound.iter()), |row| {
                    row.get(0)
                })?;
            Ok(count as usize)
        })
    }

    /// Fetch every matching entry, newest assignment first, with production
    /// figures computed under `view`.
    pub fn fetch(&self, query: &QueryParameters, view: ProductionView) -> Result<Vec<HistoryEntry>> {
        self.with_conn(|conn| {
            let (clause, bound) = query.where_clause();
            let sql = if clause.is_empty() {
                format!("SELECT {SELECT_COLUMNS} FROM work_unit_history ORDER BY assigned DESC")
            } else {
                format!(
                    "SELECT {SELECT_COLUMNS} FROM work_unit_history WHERE {clause} ORDER BY assigned DESC"
                )
            };
            fetch_entries(conn, &sql, bound, view)
        })
    }

    /// One page of matching entries. Pages are 1-based; `total_count` covers
    /// the whole query, not just the page.
    pub fn page(
        &self,
        page: usize,
        page_size: usize,
        query: &QueryParameters,
        view: ProductionView,
    ) -> Result<HistoryPage> {
        if page_size == 0 {
            return Err(Error::Query("page size must be positive".to_string()));
        }
        let page = page.max(1);
        let total_count = self.count(query)?;

        let entries = self.with_conn(|conn| {
            let (clause, bound) = query.where_clause();
            let offset = (page - 1) * page_size;
            let sql = if clause.is_empty() {
                format!(
                    "SELECT {SELECT_COLUMNS} FROM work_unit_history \
                     ORDER BY assigned DESC LIMIT {page_size} OFFSET {offset}"
                )
            } else {
                format!(
                    "SELECT {SELECT_COLUMNS} FROM work_unit_history WHERE {clause} \
                     ORDER BY assigned DESC LIMIT {page_size} OFFSET {offset}"
                )
            };
            fetch_entries(conn, &sql, bound, view)
        })?;

        Ok(HistoryPage {
            entries,
            total_count,
            page,
            page_size,
        })
    }
}

fn fetch_entries(
    conn: &Connection,
    sql: &str,
    bound: Vec<Box<dyn rusqlite::ToSql>>,
    view: ProductionView,
) -> Result<Vec<HistoryEntry>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(bound.iter()), row_to_entry)?;

    let mut entries = Vec::new();
    for row in rows {
        let mut entry = row?;
        production::apply_view(&mut entry, view);
        entries.push(entry);
    }
    Ok(entries)
}

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<HistoryEntry> {
    Ok(HistoryEntry {
        id: row.get(0)?,
        project: ProjectId::new(row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?),
        client_name: row.get(5)?,
        client_path: row.get(6)?,
        username: row.get(7)?,
        team: row.get(8)?,
        core_version: row.get(9)?,
        frames_completed: row.get(10)?,
        frame_time_secs: row.get(11)?,
        result: result_from_str(&row.get::<_, String>(12)?),
        assigned: match row.get::<_, Option<String>>(13)? {
            Some(text) => Some(parse_timestamp(13, text)?),
            None => None,
        },
        finished: match row.get::<_, Option<String>>(14)? {
            Some(text) => Some(parse_timestamp(14, text)?),
            None => None,
        },
        work_unit_name: row.get(15)?,
        k_factor: row.get(16)?,
        core_name: row.get(17)?,
        frames: row.get(18)?,
        atoms: row.get(19)?,
        base_credit: row.get(20)?,
        preferred_days: row.get(21)?,
        maximum_days: row.get(22)?,
        credit: 0.0,
        ppd: 0.0,
    })
}

fn parse_timestamp(index: usize, text: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|err| {
            rusqlite::Error::FromSqlConversionFailure(
                index,
                rusqlite::types::Type::Text,
                Box::new(err),
            )
        })
}

fn result_to_str(result: WorkUnitResult) -> &'static str {
    match result {
        WorkUnitResult::Unknown => "Unknown",
        WorkUnitResult::FinishedUnit => "FinishedUnit",
        WorkUnitResult::EarlyUnitEnd => "EarlyUnitEnd",
        WorkUnitResult::Interrupted => "Interrupted",
        WorkUnitResult::BadWorkUnit => "BadWorkUnit",
        WorkUnitResult::CoreOutdated => "CoreOutdated",
        WorkUnitResult::UnstableMachine => "UnstableMachine",
        WorkUnitResult::InProgress => "InProgress",
    }
}

fn result_from_str(text: &str) -> WorkUnitResult {
    match text {
        "FinishedUnit" => WorkUnitResult::FinishedUnit,
        "EarlyUnitEnd" => WorkUnitResult::EarlyUnitEnd,
        "Interrupted" => WorkUnitResult::Interrupted,
        "BadWorkUnit" => WorkUnitResult::BadWorkUnit,
        "CoreOutdated" => WorkUnitResult::CoreOutdated,
        "UnstableMachine" => WorkUnitResult::UnstableMachine,
        "InProgress" => WorkUnitResult::InProgress,
        _ => WorkUnitResult::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{HistoryColumn, QueryField, QueryOperator, QueryValue};
    use chrono::TimeZone;
    use foldwatch_types::FrameObservation;

    fn finished_unit(project: u32, assigned_secs: i64) -> WorkUnit {
        let assigned = Utc.timestamp_opt(assigned_secs, 0).unwrap();
        let mut unit = WorkUnit::new(ProjectId::new(project, 0, 5, 12), 0, "rig", "/var/lib/fah");
        unit.assigned = Some(assigned);
        unit.finished = Some(assigned + chrono::Duration::hours(8));
        unit.result = WorkUnitResult::FinishedUnit;
        unit.username = Some("user".to_string());
        unit.team = Some(32);
        unit.frames_expected = 100;
        for i in 1..=100u32 {
            unit.frames.insert(
                i,
                FrameObservation {
                    id: i,
                    timestamp: assigned + chrono::Duration::seconds(i as i64 * 288),
                    duration: (i > 1).then(|| chrono::Duration::seconds(288)),
                },
            );
        }
        unit
    }

    fn protein() -> Protein {
        Protein {
            project: 9999,
            work_unit_name: "p9999_lambda".to_string(),
            credit: 1000.0,
            frames: 100,
            k_factor: 2.0,
            core_name: "GRO_A7".to_string(),
            atoms: 250_000,
            preferred_days: 2.0,
            maximum_days: 4.0,
        }
    }

    #[test]
    fn test_insert_and_fetch_round_trip() {
        let db = HistoryDatabase::open_in_memory().unwrap();
        let unit = finished_unit(9999, 1_700_000_000);

        assert!(db.insert(&unit, Some(&protein())).unwrap());

        let entries = db
            .fetch(&QueryParameters::select_all(), ProductionView::FrameTime)
            .unwrap();
        assert_eq!(entries.len(), 1);

        let entry = &entries[0];
        assert_eq!(entry.project, unit.project);
        assert_eq!(entry.frames_completed, 100);
        assert_eq!(entry.frame_time_secs, 288);
        assert_eq!(entry.result, WorkUnitResult::FinishedUnit);
        assert_eq!(entry.work_unit_name.as_deref(), Some("p9999_lambda"));
        assert!(entry.credit > 0.0);
        assert!(entry.ppd > 0.0);
    }

    #[test]
    fn test_double_insert_is_deduplicated() {
        let db = HistoryDatabase::open_in_memory().unwrap();
        let unit = finished_unit(9999, 1_700_000_000);

        assert!(db.insert(&unit, None).unwrap());
        assert!(!db.insert(&unit, None).unwrap());
        assert_eq!(db.count(&QueryParameters::select_all()).unwrap(), 1);
    }

    #[test]
    fn test_non_terminal_unit_is_rejected() {
        let db = HistoryDatabase::open_in_memory().unwrap();
        let mut unit = finished_unit(9999, 1_700_000_000);
        unit.result = WorkUnitResult::InProgress;
        assert!(!db.insert(&unit, None).unwrap());

        // A failed unit needs its assignment time; only finished units may
        // fall back to the finish time.
        let mut unit = finished_unit(9999, 1_700_000_000);
        unit.result = WorkUnitResult::EarlyUnitEnd;
        unit.assigned = None;
        assert!(!db.insert(&unit, None).unwrap());

        assert_eq!(db.count(&QueryParameters::select_all()).unwrap(), 0);
    }

    #[test]
    fn test_finished_unit_without_download_time_is_archived() {
        let db = HistoryDatabase::open_in_memory().unwrap();
        let mut unit = finished_unit(9999, 1_700_000_000);
        unit.assigned = None;

        assert!(db.insert(&unit, Some(&protein())).unwrap());
        // Re-archiving dedups on the finish time when no download is known.
        assert!(!db.insert(&unit, Some(&protein())).unwrap());

        let entries = db
            .fetch(&QueryParameters::select_all(), ProductionView::FrameTime)
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].assigned, None);
        assert!(entries[0].finished.is_some());
        assert_eq!(entries[0].result, WorkUnitResult::FinishedUnit);
    }

    #[test]
    fn test_query_filters_rows() {
        let db = HistoryDatabase::open_in_memory().unwrap();
        db.insert(&finished_unit(9999, 1_700_000_000), None).unwrap();
        db.insert(&finished_unit(8888, 1_700_100_000), None).unwrap();

        let query = QueryParameters {
            name: "one project".to_string(),
            fields: vec![QueryField {
                column: HistoryColumn::Project,
                op: QueryOperator::Equal,
                value: QueryValue::Integer(9999),
            }],
        };
        let entries = db.fetch(&query, ProductionView::FrameTime).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].project.project, 9999);
    }

    #[test]
    fn test_fetch_orders_newest_first() {
        let db = HistoryDatabase::open_in_memory().unwrap();
        db.insert(&finished_unit(1111, 1_700_000_000), None).unwrap();
        db.insert(&finished_unit(2222, 1_700_200_000), None).unwrap();
        db.insert(&finished_unit(3333, 1_700_100_000), None).unwrap();

        let entries = db
            .fetch(&QueryParameters::select_all(), ProductionView::FrameTime)
            .unwrap();
        let projects: Vec<u32> = entries.iter().map(|e| e.project.project).collect();
        assert_eq!(projects, vec![2222, 3333, 1111]);
    }

    #[test]
    fn test_paging() {
        let db = HistoryDatabase::open_in_memory().unwrap();
        for i in 0..5 {
            db.insert(&finished_unit(1000 + i, 1_700_000_000 + i as i64 * 1000), None)
                .unwrap();
        }

        let page = db
            .page(1, 2, &QueryParameters::select_all(), ProductionView::FrameTime)
            .unwrap();
        assert_eq!(page.entries.len(), 2);
        assert_eq!(page.total_count, 5);
        assert_eq!(page.page_count(), 3);

        let last = db
            .page(3, 2, &QueryParameters::select_all(), ProductionView::FrameTime)
            .unwrap();
        assert_eq!(last.entries.len(), 1);
    }

    #[test]
    fn test_delete_by_id() {
        let db = HistoryDatabase::open_in_memory().unwrap();
        db.insert(&finished_unit(9999, 1_700_000_000), None).unwrap();

        let entries = db
            .fetch(&QueryParameters::select_all(), ProductionView::FrameTime)
            .unwrap();
        assert_eq!(db.delete(entries[0].id).unwrap(), 1);
        assert_eq!(db.delete(entries[0].id).unwrap(), 0);
        assert_eq!(db.count(&QueryParameters::select_all()).unwrap(), 0);
    }

    #[test]
    fn test_file_backed_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.db");

        {
            let db = HistoryDatabase::open(&path).unwrap();
            db.insert(&finished_unit(9999, 1_700_000_000), Some(&protein()))
                .unwrap();
        }

        let db = HistoryDatabase::open(&path).unwrap();
        assert_eq!(db.count(&QueryParameters::select_all()).unwrap(), 1);
    }
}
