//! One polling pass over the job store.

use std::sync::Arc;

use tracing::{info, info_span, warn};

use super::JobHandler;
use crate::config::Settings;
use crate::connector::{Connector, ConnectorRegistry};
use crate::db::{DatabaseError, JobStore};
use crate::error::Result;
use crate::job::{Job, Status};

/// What a pass did, for logging and tests.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PassSummary {
    /// RUNNING jobs polled.
    pub polled: usize,
    /// RUNNING jobs whose record changed.
    pub advanced: usize,
    /// RUNNING jobs counted after advancing.
    pub running: u64,
    /// NEW jobs claimed and started (successfully or not).
    pub started: usize,
    /// NEW jobs another run had already claimed.
    pub lost_claims: usize,
}

pub struct JobManager {
    store: JobStore,
    handler: JobHandler,
    max_running_jobs: u64,
}

impl JobManager {
    pub fn new(store: JobStore, handler: JobHandler, max_running_jobs: u64) -> Self {
        Self {
            store,
            handler,
            max_running_jobs,
        }
    }

    /// Opens the store and builds the configured connector.
    pub fn from_settings(settings: &Settings, registry: &ConnectorRegistry) -> Result<Self> {
        let connector: Arc<dyn Connector> = Arc::from(registry.create(settings)?);
        let store = JobStore::open(&settings.database_path, settings.dry_run)?;
        let handler = JobHandler::new(connector, settings);
        Ok(Self::new(store, handler, settings.max_running_jobs))
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    /// Advances every RUNNING job, then starts NEW jobs while fewer than
    /// `max_running_jobs` are running. Store errors abort the pass.
    pub fn run_once(&self) -> std::result::Result<PassSummary, DatabaseError> {
        let mut summary = PassSummary::default();

        for job in self.store.fetch(Status::RUNNING)? {
            let _span = job_span(&job).entered();
            summary.polled += 1;
            let updates = self.handler.advance_running_job(&job);
            if !updates.is_empty() {
                self.store.update(&job, &updates)?;
                summary.advanced += 1;
            }
        }

        summary.running = self.store.count(Status::RUNNING)?;
        info!(
            running = summary.running,
            limit = self.max_running_jobs,
            "Jobs running on the compute resource"
        );

        if summary.running >= self.max_running_jobs {
            info!("At capacity; no new jobs started this pass");
            return Ok(summary);
        }
        let slots = (self.max_running_jobs - summary.running) as usize;

        for job in self.store.fetch(Status::NEW)? {
            if summary.started >= slots {
                break;
            }
            let _span = job_span(&job).entered();
            if !self.store.claim(&job)? {
                warn!("Job already claimed by another run; skipping");
                summary.lost_claims += 1;
                continue;
            }
            summary.started += 1;
            let updates = self.handler.start_new_job(&job);
            self.store.update(&job, &updates)?;
        }

        info!(
            polled = summary.polled,
            advanced = summary.advanced,
            started = summary.started,
            "Pass complete"
        );
        Ok(summary)
    }

    /// Releases the store connection.
    pub fn finish(self) -> std::result::Result<(), DatabaseError> {
        self.store.close()
    }
}

fn job_span(job: &Job) -> tracing::Span {
    info_span!("job", id = job.id(), job_type = %job.job_type())
}
