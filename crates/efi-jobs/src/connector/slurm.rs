//! Slurm and Nextflow command lines shared by the scheduler-backed
//! connectors, plus parsing of what `sbatch` and `sacct` print.

use std::path::Path;
use std::process::Command;

use crate::config::{NextflowSettings, SlurmSettings};
use crate::error::ConnectorError;
use crate::job::{Pipeline, Status};

/// `nextflow -C <conf> run <pipeline.nf> -params-file <params> -w <dir>/work`
pub fn nextflow_command(
    nextflow: &NextflowSettings,
    pipeline: Pipeline,
    params_path: &str,
    job_dir: &str,
) -> String {
    let name = pipeline.as_str();
    let script = nextflow
        .pipeline_dir
        .join(name)
        .join(format!("{}.nf", name));
    let config = nextflow.config_dir.join(name).join("slurm.config");
    format!(
        "{} -C {} run {} -params-file {} -w {}/work",
        nextflow.executable,
        config.display(),
        script.display(),
        params_path,
        job_dir.trim_end_matches('/')
    )
}

/// Arguments for `sbatch` wrapping the nextflow driver.
pub fn sbatch_args(slurm: &SlurmSettings, job_id: i64, job_dir: &str, wrapped: &str) -> Vec<String> {
    vec![
        format!("--job-name=job_{}", job_id),
        format!("--mem={}", slurm.memory),
        format!("--ntasks={}", slurm.ntasks),
        format!("--cpus-per-task={}", slurm.cpus_per_task),
        format!("--partition={}", slurm.partition),
        format!("--output={}/job_{}.out", job_dir.trim_end_matches('/'), job_id),
        format!("--wrap={}", wrapped),
    ]
}

pub fn sacct_args(scheduler_job_id: i64) -> Vec<String> {
    vec![
        "-j".to_string(),
        scheduler_job_id.to_string(),
        "--format=State".to_string(),
        "--noheader".to_string(),
    ]
}

/// Extracts the job number from `Submitted batch job <n>`.
pub fn parse_sbatch_output(stdout: &str) -> Option<i64> {
    stdout
        .lines()
        .find(|line| line.contains("Submitted batch job"))
        .and_then(|line| line.split_whitespace().last())
        .and_then(|id| id.parse().ok())
}

/// Maps a scheduler state word to a poll status. `sacct` truncates long
/// states to ten characters (`OUT_OF_ME+`), so the marker is stripped first.
pub fn map_state(state: &str) -> Status {
    let word = state
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .trim_end_matches('+')
        .to_ascii_uppercase();

    match word.as_str() {
        "COMPLETED" | "FINISHED" => Status::FINISHED,
        "FAILED" | "CANCELLED" | "TIMEOUT" | "OUT_OF_MEMORY" | "OUT_OF_ME" => Status::FAILED,
        "RUNNING" | "PENDING" => Status::RUNNING,
        _ => Status::UNKNOWN,
    }
}

/// Maps the first line of `sacct --format=State --noheader` output.
pub fn parse_sacct_output(stdout: &str) -> Status {
    stdout
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(map_state)
        .unwrap_or(Status::UNKNOWN)
}

/// Quotes one word for a POSIX shell command line.
pub fn shell_quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:@%+,".contains(c));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', "'\\''"))
    }
}

pub fn shell_join<S: AsRef<str>>(words: &[S]) -> String {
    words
        .iter()
        .map(|w| shell_quote(w.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Runs a command to completion and returns its trimmed stdout.
pub fn run_command(program: &str, args: &[String], cwd: Option<&Path>) -> Result<String, ConnectorError> {
    let mut cmd = Command::new(program);
    cmd.args(args);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    tracing::debug!(program, args = %shell_join(args), "Running command");

    let output = cmd.output().map_err(|e| ConnectorError::Spawn {
        program: program.to_string(),
        source: e,
    })?;

    if !output.status.success() {
        return Err(ConnectorError::CommandFailed {
            program: program.to_string(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
