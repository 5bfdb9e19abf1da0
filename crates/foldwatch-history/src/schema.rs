use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Version the current code writes. Stored per database and compared on open.
pub const SCHEMA_VERSION: u32 = 3;

/// Original table layout. Later columns arrive through upgrades so that a
/// fresh database and an old one walk the same path.
const BASE_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS work_unit_history (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    project          INTEGER NOT NULL,
    run              INTEGER NOT NULL,
    clone            INTEGER NOT NULL,
    gen              INTEGER NOT NULL,
    client_name      TEXT NOT NULL,
    client_path      TEXT NOT NULL,
    username         TEXT,
    team             INTEGER,
    core_version     TEXT,
    frames_completed INTEGER NOT NULL,
    frame_time_secs  INTEGER NOT NULL,
    result           TEXT NOT NULL,
    assigned         TEXT NOT NULL,
    finished         TEXT
);
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);
";

struct Upgrade {
    version: u32,
    name: &'static str,
    apply: fn(&Connection) -> rusqlite::Result<()>,
}

const UPGRADES: &[Upgrade] = &[
    Upgrade {
        version: 1,
        name: "remove duplicate work units",
        apply: upgrade_remove_duplicates,
    },
    Upgrade {
        version: 2,
        name: "add protein detail columns",
        apply: upgrade_add_protein_columns,
    },
    Upgrade {
        version: 3,
        name: "allow unknown assignment time",
        apply: upgrade_nullable_assigned,
    },
];

/// Bring a database up to [`SCHEMA_VERSION`]. Safe to call on every open:
/// upgrades already recorded in `schema_version` are skipped, and each
/// upgrade commits atomically with its version bump.
pub(crate) fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute_batch(BASE_SCHEMA)?;

    let stored = stored_version(conn)?;
    if stored > SCHEMA_VERSION {
        return Err(Error::Query(format!(
            "database schema version {stored} is newer than supported version {SCHEMA_VERSION}"
        )));
    }

    for upgrade in UPGRADES.iter().filter(|u| u.version > stored) {
        info!(version = upgrade.version, name = upgrade.name, "applying schema upgrade");
        let tx = conn.transaction().map_err(Error::Database)?;
        if let Err(err) = (upgrade.apply)(&tx) {
            return Err(Error::Upgrade {
                version: upgrade.version as i32,
                source: Box::new(Error::Database(err)),
            });
        }
        tx.execute("DELETE FROM schema_version", [])
            .and_then(|_| {
                tx.execute(
                    "INSERT INTO schema_version (version) VALUES (?1)",
                    [upgrade.version],
                )
            })
            .and_then(|_| tx.commit())
            .map_err(|err| Error::Upgrade {
                version: upgrade.version as i32,
                source: Box::new(Error::Database(err)),
            })?;
    }

    Ok(())
}

pub(crate) fn stored_version(conn: &Connection) -> Result<u32> {
    let version = conn
        .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
            row.get::<_, Option<u32>>(0)
        })?
        .unwrap_or(0);
    Ok(version)
}

/// Early versions could archive the same unit twice when a retrieval raced a
/// client restart. Keep the newest row of each (identity, assigned) group.
fn upgrade_remove_duplicates(conn: &Connection) -> rusqlite::Result<()> {
    let deleted = conn.execute(
        "DELETE FROM work_unit_history
         WHERE id NOT IN (
             SELECT MAX(id) FROM work_unit_history
             GROUP BY project, run, clone, gen, assigned
         )",
        [],
    )?;
    debug!(deleted, "duplicate work units removed");
    Ok(())
}

fn upgrade_add_protein_columns(conn: &Connection) -> rusqlite::Result<()> {
    const COLUMNS: &[&str] = &[
        "work_unit_name TEXT",
        "k_factor REAL",
        "core_name TEXT",
        "frames INTEGER",
        "atoms INTEGER",
        "base_credit REAL",
        "preferred_days REAL",
        "maximum_days REAL",
    ];
    for column in COLUMNS {
        conn.execute_batch(&format!("ALTER TABLE work_unit_history ADD COLUMN {column};"))?;
    }
    Ok(())
}

/// A finished unit can be archived before its download time is ever seen, so
/// `assigned` must accept NULL. SQLite cannot drop NOT NULL in place; rebuild
/// the table with the relaxed column and carry every row (and id) across.
fn upgrade_nullable_assigned(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE work_unit_history_v3 (
            id               INTEGER PRIMARY KEY AUTOINCREMENT,
            project          INTEGER NOT NULL,
            run              INTEGER NOT NULL,
            clone            INTEGER NOT NULL,
            gen              INTEGER NOT NULL,
            client_name      TEXT NOT NULL,
            client_path      TEXT NOT NULL,
            username         TEXT,
            team             INTEGER,
            core_version     TEXT,
            frames_completed INTEGER NOT NULL,
            frame_time_secs  INTEGER NOT NULL,
            result           TEXT NOT NULL,
            assigned         TEXT,
            finished         TEXT,
            work_unit_name   TEXT,
            k_factor         REAL,
            core_name        TEXT,
            frames           INTEGER,
            atoms            INTEGER,
            base_credit      REAL,
            preferred_days   REAL,
            maximum_days     REAL
        );
        INSERT INTO work_unit_history_v3 SELECT * FROM work_unit_history;
        DROP TABLE work_unit_history;
        ALTER TABLE work_unit_history_v3 RENAME TO work_unit_history;",
    )
}
