//! Schema versioning for the job database.
//!
//! Applied versions are recorded in `_migrations`. The `Job` table is often
//! created by the web front end before the engine first runs, so the table
//! statement is `IF NOT EXISTS` and the next step adds whichever declared
//! columns that schema lacks. Indexes come last so they only name columns
//! that exist.

use std::collections::HashSet;

use rusqlite::Connection;

use super::error::DatabaseError;
use crate::job::variants::ALL_GROUPS;
use crate::job::FieldKind;

enum Step {
    Sql(&'static str),
    /// Adds every column declared in the field groups that the `Job` table
    /// does not have yet.
    AddMissingColumns,
}

struct Migration {
    version: u32,
    description: &'static str,
    step: Step,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create_job_table",
        step: Step::Sql(include_str!("sql/001_create_job_table.sql")),
    },
    Migration {
        version: 2,
        description: "add_missing_job_columns",
        step: Step::AddMissingColumns,
    },
    Migration {
        version: 3,
        description: "create_job_indexes",
        step: Step::Sql(include_str!("sql/003_create_job_indexes.sql")),
    },
];

/// Version the schema reaches once every migration is applied.
pub fn latest_version() -> u32 {
    MIGRATIONS.iter().map(|m| m.version).max().unwrap_or(0)
}

/// Highest applied version, 0 when `_migrations` does not exist yet.
fn applied_version(conn: &Connection) -> rusqlite::Result<u32> {
    let tracked: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = '_migrations')",
        [],
        |r| r.get(0),
    )?;
    if !tracked {
        return Ok(0);
    }
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |r| r.get(0),
    )
}

/// Fails unless every migration has been applied. Used where the schema may
/// be read but not changed.
pub fn check_current(conn: &Connection) -> Result<(), DatabaseError> {
    let found = applied_version(conn)?;
    let expected = latest_version();
    if found < expected {
        return Err(DatabaseError::SchemaOutdated { found, expected });
    }
    Ok(())
}

/// Applies every migration newer than the recorded version, each in its own
/// transaction.
pub fn run_all(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let applied = applied_version(conn)?;

    for migration in MIGRATIONS.iter().filter(|m| m.version > applied) {
        log::info!(
            "Applying schema v{} ({})",
            migration.version,
            migration.description
        );
        let failed = |e: rusqlite::Error| DatabaseError::Migration {
            version: migration.version,
            reason: e.to_string(),
        };

        let tx = conn.unchecked_transaction()?;
        match migration.step {
            Step::Sql(sql) => tx.execute_batch(sql).map_err(failed)?,
            Step::AddMissingColumns => add_missing_columns(&tx).map_err(failed)?,
        }
        tx.execute(
            "INSERT INTO _migrations (version, description) VALUES (?1, ?2)",
            rusqlite::params![migration.version, migration.description],
        )?;
        tx.commit()?;
    }

    Ok(())
}

fn sql_type(kind: FieldKind) -> &'static str {
    match kind {
        FieldKind::Int | FieldKind::Bool => "INTEGER",
        FieldKind::Float => "REAL",
        FieldKind::Text | FieldKind::Time | FieldKind::Status => "TEXT",
    }
}

fn job_columns(conn: &Connection) -> rusqlite::Result<HashSet<String>> {
    let mut stmt = conn.prepare("PRAGMA table_info(\"Job\")")?;
    let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
    names.collect()
}

fn add_missing_columns(conn: &Connection) -> rusqlite::Result<()> {
    let mut existing = job_columns(conn)?;
    for field in ALL_GROUPS.iter().flat_map(|g| g.fields.iter()) {
        if existing.contains(field.name) {
            continue;
        }
        log::info!("Adding column Job.{}", field.name);
        conn.execute_batch(&format!(
            "ALTER TABLE \"Job\" ADD COLUMN \"{}\" {};",
            field.name,
            sql_type(field.kind)
        ))?;
        existing.insert(field.name.to_string());
    }
    Ok(())
}
