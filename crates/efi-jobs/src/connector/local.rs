//! Backend for a Slurm cluster sharing a filesystem with this host.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use super::slurm;
use super::{stage_locally, Connector, WorkingRef};
use crate::config::{NextflowSettings, Settings, SlurmSettings};
use crate::error::ConnectorError;
use crate::job::{Job, Pipeline, Status};

pub struct LocalConnector {
    job_root: PathBuf,
    nextflow: NextflowSettings,
    slurm: SlurmSettings,
    dry_run: bool,
}

impl LocalConnector {
    pub fn new(settings: &Settings) -> Self {
        Self {
            job_root: settings.local_job_directory.clone(),
            nextflow: settings.nextflow.clone(),
            slurm: settings.slurm.clone(),
            dry_run: settings.dry_run,
        }
    }

    fn job_dir(&self, job_id: i64) -> PathBuf {
        self.job_root.join(job_id.to_string())
    }

    fn sbatch_args(&self, job_id: i64, working: &WorkingRef, pipeline: Pipeline) -> Vec<String> {
        let job_dir = working.parent_dir();
        let wrapped = slurm::nextflow_command(&self.nextflow, pipeline, working.as_str(), &job_dir);
        slurm::sbatch_args(&self.slurm, job_id, &job_dir, &wrapped)
    }
}

impl Connector for LocalConnector {
    fn name(&self) -> &'static str {
        "local"
    }

    fn prepare_environment(
        &self,
        job_id: i64,
        params: &Map<String, Value>,
        input_file: Option<&Path>,
    ) -> Result<WorkingRef, ConnectorError> {
        stage_locally(&self.job_dir(job_id), params, input_file, self.dry_run)
    }

    fn submit(
        &self,
        job_id: i64,
        working: &WorkingRef,
        pipeline: Pipeline,
    ) -> Result<i64, ConnectorError> {
        let args = self.sbatch_args(job_id, working, pipeline);

        if self.dry_run {
            tracing::info!(command = %format!("sbatch {}", slurm::shell_join(&args)), "[dry-run] would submit");
            return Ok(job_id);
        }

        let job_dir = working.parent_dir();
        let stdout = slurm::run_command("sbatch", &args, Some(Path::new(&job_dir)))?;
        slurm::parse_sbatch_output(&stdout).ok_or(ConnectorError::UnexpectedOutput {
            program: "sbatch".to_string(),
            output: stdout,
        })
    }

    fn poll_status(&self, scheduler_job_id: i64) -> Status {
        if self.dry_run {
            return Status::FINISHED;
        }

        match slurm::run_command("sacct", &slurm::sacct_args(scheduler_job_id), None) {
            Ok(stdout) => slurm::parse_sacct_output(&stdout),
            Err(e) => {
                tracing::warn!(scheduler_job_id, error = %e, "sacct failed");
                Status::UNKNOWN
            }
        }
    }

    fn retrieve_results(&self, job: &Job) -> Result<(), ConnectorError> {
        tracing::debug!(job_id = job.id(), "Results already on the shared filesystem");
        Ok(())
    }
}
