//! Backend for a remote Slurm cluster reached over SSH.
//!
//! Files move with `scp`, commands run through `ssh`. Both authenticate with
//! the configured key in batch mode so a missing key fails instead of
//! prompting.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use super::slurm::{self, shell_join};
use super::{create_dir, render_params, with_output_dir, write_params, Connector, WorkingRef, PARAMS_FILE};
use crate::config::{HpcSettings, NextflowSettings, Settings, SlurmSettings};
use crate::error::ConnectorError;
use crate::job::{Job, Pipeline, Status};

pub struct HpcConnector {
    hpc: HpcSettings,
    local_root: PathBuf,
    nextflow: NextflowSettings,
    slurm: SlurmSettings,
    dry_run: bool,
}

impl HpcConnector {
    pub fn new(settings: &Settings) -> Result<Self, ConnectorError> {
        let hpc = settings
            .hpc
            .clone()
            .ok_or(ConnectorError::MissingSettings {
                connector: "hpc",
                section: "hpc",
            })?;
        Ok(Self {
            hpc,
            local_root: settings.local_job_directory.clone(),
            nextflow: settings.nextflow.clone(),
            slurm: settings.slurm.clone(),
            dry_run: settings.dry_run,
        })
    }

    fn remote_dir(&self, job_id: i64) -> String {
        self.hpc
            .remote_job_directory
            .join(job_id.to_string())
            .to_string_lossy()
            .into_owned()
    }

    fn key_args(&self) -> Vec<String> {
        vec![
            "-i".to_string(),
            self.hpc.ssh_key_path.to_string_lossy().into_owned(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
        ]
    }

    fn ssh_args(&self, remote_command: &str) -> Vec<String> {
        let mut args = self.key_args();
        args.push(self.hpc.destination());
        args.push(remote_command.to_string());
        args
    }

    fn ssh(&self, remote_command: &str) -> Result<String, ConnectorError> {
        slurm::run_command("ssh", &self.ssh_args(remote_command), None)
    }

    fn scp_to(&self, local: &Path, remote: &str) -> Result<(), ConnectorError> {
        let mut args = self.key_args();
        args.push(local.to_string_lossy().into_owned());
        args.push(format!("{}:{}", self.hpc.destination(), remote));
        slurm::run_command("scp", &args, None).map(|_| ())
    }

    fn scp_from(&self, remote_dir: &str, local: &Path) -> Result<(), ConnectorError> {
        let mut args = self.key_args();
        args.push("-r".to_string());
        args.push(format!("{}:{}/.", self.hpc.destination(), remote_dir));
        args.push(local.to_string_lossy().into_owned());
        slurm::run_command("scp", &args, None).map(|_| ())
    }

    fn submit_command(&self, job_id: i64, working: &WorkingRef, pipeline: Pipeline) -> String {
        let remote_dir = working.parent_dir();
        let wrapped = slurm::nextflow_command(&self.nextflow, pipeline, working.as_str(), &remote_dir);
        let mut words = vec!["sbatch".to_string()];
        words.extend(slurm::sbatch_args(&self.slurm, job_id, &remote_dir, &wrapped));
        format!("cd {} && {}", slurm::shell_quote(&remote_dir), shell_join(&words))
    }
}

impl Connector for HpcConnector {
    fn name(&self) -> &'static str {
        "hpc"
    }

    fn prepare_environment(
        &self,
        job_id: i64,
        params: &Map<String, Value>,
        input_file: Option<&Path>,
    ) -> Result<WorkingRef, ConnectorError> {
        let remote_dir = self.remote_dir(job_id);
        let output_dir = format!("{}/output", remote_dir);
        let remote_params = format!("{}/{}", remote_dir, PARAMS_FILE);
        let params = with_output_dir(params, &output_dir);

        if self.dry_run {
            tracing::info!(
                host = %self.hpc.hostname,
                path = %remote_params,
                params = %render_params(&params)?,
                "[dry-run] would stage parameter file"
            );
            return Ok(WorkingRef::new(remote_params));
        }

        self.ssh(&format!("mkdir -p {}", slurm::shell_quote(&output_dir)))?;

        let staging = tempfile::tempdir().map_err(|e| ConnectorError::Io {
            path: std::env::temp_dir(),
            source: e,
        })?;
        let local_params = staging.path().join(PARAMS_FILE);
        write_params(&local_params, &params)?;
        self.scp_to(&local_params, &remote_params)?;

        if let Some(input) = input_file {
            self.scp_to(input, &format!("{}/", remote_dir))?;
        }

        tracing::debug!(job_id, remote = %remote_params, "Staged job on cluster");
        Ok(WorkingRef::new(remote_params))
    }

    fn submit(
        &self,
        job_id: i64,
        working: &WorkingRef,
        pipeline: Pipeline,
    ) -> Result<i64, ConnectorError> {
        let command = self.submit_command(job_id, working, pipeline);

        if self.dry_run {
            tracing::info!(host = %self.hpc.hostname, %command, "[dry-run] would submit");
            return Ok(job_id);
        }

        let stdout = self.ssh(&command)?;
        slurm::parse_sbatch_output(&stdout).ok_or(ConnectorError::UnexpectedOutput {
            program: "sbatch".to_string(),
            output: stdout,
        })
    }

    fn poll_status(&self, scheduler_job_id: i64) -> Status {
        if self.dry_run {
            return Status::FINISHED;
        }

        let command = format!("sacct {}", shell_join(&slurm::sacct_args(scheduler_job_id)));
        match self.ssh(&command) {
            Ok(stdout) => slurm::parse_sacct_output(&stdout),
            Err(e) => {
                tracing::warn!(scheduler_job_id, error = %e, "Remote sacct failed");
                Status::UNKNOWN
            }
        }
    }

    fn retrieve_results(&self, job: &Job) -> Result<(), ConnectorError> {
        let remote_output = format!("{}/output", self.remote_dir(job.id()));
        let local_dir = self.local_root.join(job.id().to_string());

        if self.dry_run {
            tracing::info!(
                remote = %remote_output,
                local = %local_dir.display(),
                "[dry-run] would copy results"
            );
            return Ok(());
        }

        create_dir(&local_dir)?;
        self.scp_from(&remote_output, &local_dir)?;
        tracing::debug!(job_id = job.id(), local = %local_dir.display(), "Copied results");
        Ok(())
    }
}
