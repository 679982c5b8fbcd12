use std::path::PathBuf;
use thiserror::Error;

use crate::job::Status;

/// Errors from the job database. Any of these aborts the current pass.
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Cannot create database directory '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Schema migration v{version} failed: {reason}")]
    Migration { version: u32, reason: String },

    #[error("Database file '{path}' does not exist")]
    Missing { path: PathBuf },

    /// The schema can only be brought up to date by a writing run.
    #[error("Database schema is at v{found} but v{expected} is required; run `efi-jobs init-db` without --dry-run")]
    SchemaOutdated { found: u32, expected: u32 },

    #[error("Database lock poisoned")]
    LockPoisoned,

    /// An update tried to store a union or poll-only status.
    #[error("Refusing to store non-primitive status '{status}' for job {id}")]
    UnstorableStatus { id: i64, status: Status },

    /// Another clone of the handle is still alive.
    #[error("Database connection is still in use")]
    InUse,
}
