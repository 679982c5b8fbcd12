//! The job store used by the engine.
//!
//! Wraps [`Database`] with the rules for what the engine may write: only
//! fields flagged updatable for the job's variant, only storable statuses,
//! and nothing at all in dry-run mode.

use std::path::Path;

use super::{job_repo, Database, DatabaseError};
use crate::job::{FieldValue, Job, Status, UpdateMap};

pub struct JobStore {
    db: Database,
    dry_run: bool,
}

impl JobStore {
    /// Opens the SQLite store at `path`. A dry-run store opens the file
    /// read-only and never migrates it.
    pub fn open(path: &Path, dry_run: bool) -> Result<Self, DatabaseError> {
        let db = if dry_run {
            Database::open_read_only(path)?
        } else {
            Database::open(path)?
        };
        Ok(Self::from_database(db, dry_run))
    }

    pub fn open_in_memory(dry_run: bool) -> Result<Self, DatabaseError> {
        Ok(Self::from_database(Database::open_in_memory()?, dry_run))
    }

    pub fn from_database(db: Database, dry_run: bool) -> Self {
        if dry_run {
            log::info!("Job store opened in dry-run mode; no changes will be written");
        }
        Self { db, dry_run }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Jobs whose status is in `mask`, ordered by id.
    pub fn fetch(&self, mask: Status) -> Result<Vec<Job>, DatabaseError> {
        job_repo::fetch_by_status(&self.db, mask)
    }

    pub fn count(&self, mask: Status) -> Result<u64, DatabaseError> {
        job_repo::count_by_status(&self.db, mask)
    }

    pub fn find(&self, id: i64) -> Result<Option<Job>, DatabaseError> {
        job_repo::find_by_id(&self.db, id)
    }

    pub fn insert(&self, job: &Job) -> Result<(), DatabaseError> {
        job_repo::insert(&self.db, job)
    }

    /// Applies `updates` to the job's row.
    ///
    /// Keys that are not updatable for the job's variant, or whose value does
    /// not fit the column, are dropped with a warning. A status that is not a
    /// single storable primitive rejects the whole update. Returns the number
    /// of fields written.
    pub fn update(&self, job: &Job, updates: &UpdateMap) -> Result<usize, DatabaseError> {
        let table = job.fields();
        let mut fields: Vec<(&str, &FieldValue)> = Vec::with_capacity(updates.len());

        for (name, value) in updates {
            let Some(spec) = table.get(name).filter(|s| s.info.is_updatable) else {
                log::warn!(
                    "Job {}: ignoring update of non-updatable field '{}'",
                    job.id(),
                    name
                );
                continue;
            };
            if !value.fits(spec.kind) {
                log::warn!(
                    "Job {}: ignoring '{}' = {} (expected {:?})",
                    job.id(),
                    name,
                    value,
                    spec.kind
                );
                continue;
            }
            if let FieldValue::Status(status) = value {
                if !status.is_storable() {
                    return Err(DatabaseError::UnstorableStatus {
                        id: job.id(),
                        status: *status,
                    });
                }
            }
            fields.push((spec.name, value));
        }

        if fields.is_empty() {
            return Ok(0);
        }

        if self.dry_run {
            for (name, value) in &fields {
                log::info!("[dry-run] job {}: {} = {}", job.id(), name, value);
            }
            return Ok(0);
        }

        job_repo::update_fields(&self.db, job.id(), &fields)?;
        log::debug!("Job {}: updated {} field(s)", job.id(), fields.len());
        Ok(fields.len())
    }

    /// Marks a `NEW` job as `SUBMITTING`. Returns false when another engine
    /// run already took it. In dry-run mode the claim always succeeds and
    /// nothing is written.
    pub fn claim(&self, job: &Job) -> Result<bool, DatabaseError> {
        if self.dry_run {
            log::info!("[dry-run] job {}: claim {} -> {}", job.id(), Status::NEW, Status::SUBMITTING);
            return Ok(true);
        }
        job_repo::claim(&self.db, job.id(), Status::NEW, Status::SUBMITTING)
    }

    /// Releases the connection.
    pub fn close(self) -> Result<(), DatabaseError> {
        self.db.close()
    }
}
