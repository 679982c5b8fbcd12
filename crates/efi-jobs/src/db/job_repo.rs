//! Job repository: queries and writes against the `Job` table.
//!
//! Rows are decoded through the field table of their `jobType`, so each
//! variant only sees its own columns.

use std::collections::HashSet;

use rusqlite::{params_from_iter, Row};

use super::{Database, DatabaseError};
use crate::job::{FieldValue, Job, JobType, Status};

const TABLE: &str = "\"Job\"";

/// Quotes a column name for use in generated SQL.
fn quote(column: &str) -> String {
    format!("\"{}\"", column.replace('"', "\"\""))
}

/// Builds `?1, ?2, ...` for `n` parameters starting at `start`.
fn placeholders(start: usize, n: usize) -> String {
    (start..start + n)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

fn status_names(mask: Status) -> Vec<&'static str> {
    mask.primitives().filter_map(Status::name).collect()
}

/// Decodes one row. Returns `Ok(None)` for rows that should be skipped.
fn job_from_row(row: &Row<'_>, columns: &HashSet<String>) -> Result<Option<Job>, DatabaseError> {
    let id: i64 = row.get("id")?;
    let type_name: String = row.get("jobType")?;

    let job_type = match type_name.parse::<JobType>() {
        Ok(t) => t,
        Err(e) => {
            log::warn!("Skipping job {}: {}", id, e);
            return Ok(None);
        }
    };

    let mut job = Job::new(id, job_type);
    for field in job_type.spec().fields.iter() {
        if !columns.contains(field.name) {
            continue;
        }
        let raw = row.get_ref(field.name)?;
        let value = match FieldValue::from_sql(field.kind, raw) {
            Ok(v) => v,
            Err(e) => {
                log::warn!("Skipping job {}: bad value in '{}': {}", id, field.name, e);
                return Ok(None);
            }
        };
        if let Err(e) = job.set(field.name, value) {
            log::warn!("Skipping job {}: {}", id, e);
            return Ok(None);
        }
    }
    Ok(Some(job))
}

/// Fetches every job whose status is contained in `mask`, ordered by id.
/// Rows of unknown type or with undecodable values are logged and skipped.
pub fn fetch_by_status(db: &Database, mask: Status) -> Result<Vec<Job>, DatabaseError> {
    let names = status_names(mask);
    if names.is_empty() {
        return Ok(Vec::new());
    }

    db.with_conn(|conn| {
        let sql = format!(
            "SELECT * FROM {} WHERE status IN ({}) ORDER BY id",
            TABLE,
            placeholders(1, names.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        let columns: HashSet<String> = stmt.column_names().into_iter().map(String::from).collect();

        let mut rows = stmt.query(params_from_iter(names.iter()))?;
        let mut jobs = Vec::new();
        while let Some(row) = rows.next()? {
            if let Some(job) = job_from_row(row, &columns)? {
                jobs.push(job);
            }
        }
        Ok(jobs)
    })
}

/// Counts jobs whose status is contained in `mask`.
pub fn count_by_status(db: &Database, mask: Status) -> Result<u64, DatabaseError> {
    let names = status_names(mask);
    if names.is_empty() {
        return Ok(0);
    }

    db.with_conn(|conn| {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE status IN ({})",
            TABLE,
            placeholders(1, names.len())
        );
        let count: u64 = conn.query_row(&sql, params_from_iter(names.iter()), |r| r.get(0))?;
        Ok(count)
    })
}

/// Finds a job by its id. Rows that cannot be decoded are reported as absent.
pub fn find_by_id(db: &Database, id: i64) -> Result<Option<Job>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!("SELECT * FROM {} WHERE id = ?1", TABLE))?;
        let columns: HashSet<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt.query([id])?;
        match rows.next()? {
            Some(row) => job_from_row(row, &columns),
            None => Ok(None),
        }
    })
}

fn insert_on(conn: &rusqlite::Connection, job: &Job) -> Result<(), DatabaseError> {
    let fields: Vec<(&str, &FieldValue)> = job
        .fields()
        .iter()
        .map(|f| (f.name, job.get(f.name)))
        .filter(|(_, v)| !v.is_null())
        .collect();

    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        TABLE,
        fields
            .iter()
            .map(|(name, _)| quote(name))
            .collect::<Vec<_>>()
            .join(", "),
        placeholders(1, fields.len())
    );
    conn.execute(&sql, params_from_iter(fields.iter().map(|(_, v)| *v)))?;
    Ok(())
}

/// Inserts a job row with every non-null field of `job`.
///
/// `uuid` is required by the table; callers seeding jobs set it themselves.
pub fn insert(db: &Database, job: &Job) -> Result<(), DatabaseError> {
    db.with_conn(|conn| insert_on(conn, job))
}

/// Inserts several jobs in one transaction.
pub fn insert_all(db: &Database, jobs: &[Job]) -> Result<(), DatabaseError> {
    db.with_transaction(|conn| {
        for job in jobs {
            insert_on(conn, job)?;
        }
        Ok(())
    })
}

/// Writes `fields` to the row with the given id in a single statement.
/// Returns the number of rows changed (0 or 1).
pub fn update_fields(
    db: &Database,
    id: i64,
    fields: &[(&str, &FieldValue)],
) -> Result<usize, DatabaseError> {
    if fields.is_empty() {
        return Ok(0);
    }

    let assignments: Vec<String> = fields
        .iter()
        .enumerate()
        .map(|(i, (name, _))| format!("{} = ?{}", quote(name), i + 1))
        .collect();
    let sql = format!(
        "UPDATE {} SET {} WHERE id = ?{}",
        TABLE,
        assignments.join(", "),
        fields.len() + 1
    );

    let id_value = FieldValue::Int(id);
    let values = fields
        .iter()
        .map(|(_, v)| *v)
        .chain(std::iter::once(&id_value));

    db.with_conn(|conn| Ok(conn.execute(&sql, params_from_iter(values))?))
}

/// Moves a job from `from` to `to` only if it is still in `from`.
/// Returns whether this caller won the transition.
pub fn claim(db: &Database, id: i64, from: Status, to: Status) -> Result<bool, DatabaseError> {
    if !from.is_storable() {
        return Err(DatabaseError::UnstorableStatus { id, status: from });
    }
    if !to.is_storable() {
        return Err(DatabaseError::UnstorableStatus { id, status: to });
    }

    db.with_conn(|conn| {
        let changed = conn.execute(
            &format!("UPDATE {} SET status = ?1 WHERE id = ?2 AND status = ?3", TABLE),
            rusqlite::params![to, id, from],
        )?;
        Ok(changed == 1)
    })
}
