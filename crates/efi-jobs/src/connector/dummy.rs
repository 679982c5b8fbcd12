//! Backend without a scheduler. Jobs are staged like the local backend and
//! reported finished on the first poll.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use super::{stage_locally, Connector, WorkingRef};
use crate::config::Settings;
use crate::error::ConnectorError;
use crate::job::{Job, Pipeline, Status};

pub struct DummyConnector {
    job_root: PathBuf,
    dry_run: bool,
}

impl DummyConnector {
    pub fn new(settings: &Settings) -> Self {
        Self {
            job_root: settings.local_job_directory.clone(),
            dry_run: settings.dry_run,
        }
    }
}

impl Connector for DummyConnector {
    fn name(&self) -> &'static str {
        "dummy"
    }

    fn prepare_environment(
        &self,
        job_id: i64,
        params: &Map<String, Value>,
        input_file: Option<&Path>,
    ) -> Result<WorkingRef, ConnectorError> {
        stage_locally(
            &self.job_root.join(job_id.to_string()),
            params,
            input_file,
            self.dry_run,
        )
    }

    fn submit(
        &self,
        job_id: i64,
        working: &WorkingRef,
        pipeline: Pipeline,
    ) -> Result<i64, ConnectorError> {
        tracing::info!(job_id, %working, %pipeline, "Dummy submit");
        Ok(job_id)
    }

    fn poll_status(&self, _scheduler_job_id: i64) -> Status {
        Status::FINISHED
    }

    fn retrieve_results(&self, _job: &Job) -> Result<(), ConnectorError> {
        Ok(())
    }
}
