//! Execution backends.
//!
//! A [`Connector`] stages a job, hands it to a scheduler, polls it and makes
//! its output visible locally. Backends are chosen by name at startup
//! through the [`ConnectorRegistry`].

pub mod api;
pub mod dummy;
pub mod hpc;
pub mod local;
pub mod slurm;

#[cfg(test)]
pub(crate) mod fake;

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::config::Settings;
use crate::error::ConnectorError;
use crate::job::{Job, Pipeline, Status};

/// File name of the parameter file staged for every job.
pub const PARAMS_FILE: &str = "params.json";

/// Opaque reference returned by [`Connector::prepare_environment`] and
/// consumed only by [`Connector::submit`]. For the filesystem backends it is
/// the path of the staged parameter file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingRef(String);

impl WorkingRef {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Directory containing the referenced file.
    pub fn parent_dir(&self) -> String {
        Path::new(&self.0)
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

impl From<PathBuf> for WorkingRef {
    fn from(path: PathBuf) -> Self {
        Self(path.to_string_lossy().into_owned())
    }
}

impl fmt::Display for WorkingRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A compute backend. Every operation is independently fallible and must be
/// side-effect free in dry-run mode.
pub trait Connector: Send + Sync {
    fn name(&self) -> &'static str;

    /// Stages the parameter file and the optional input file.
    fn prepare_environment(
        &self,
        job_id: i64,
        params: &Map<String, Value>,
        input_file: Option<&Path>,
    ) -> Result<WorkingRef, ConnectorError>;

    /// Submits the staged job and returns the scheduler's handle.
    fn submit(
        &self,
        job_id: i64,
        working: &WorkingRef,
        pipeline: Pipeline,
    ) -> Result<i64, ConnectorError>;

    /// One of `RUNNING`, `FINISHED`, `FAILED` or `UNKNOWN`. Backend errors are
    /// reported as `UNKNOWN`.
    fn poll_status(&self, scheduler_job_id: i64) -> Status;

    /// Makes the finished job's output readable under the local job directory.
    fn retrieve_results(&self, job: &Job) -> Result<(), ConnectorError>;
}

pub type ConnectorFactory = fn(&Settings) -> Result<Box<dyn Connector>, ConnectorError>;

/// Maps `execution_connector` names to constructors.
pub struct ConnectorRegistry {
    factories: BTreeMap<&'static str, ConnectorFactory>,
}

impl ConnectorRegistry {
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Registry with the `local`, `hpc`, `api` and `dummy` backends.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register("local", |s| Ok(Box::new(local::LocalConnector::new(s))));
        registry.register("hpc", |s| Ok(Box::new(hpc::HpcConnector::new(s)?)));
        registry.register("api", |s| Ok(Box::new(api::ApiConnector::new(s)?)));
        registry.register("dummy", |s| Ok(Box::new(dummy::DummyConnector::new(s))));
        registry
    }

    pub fn register(&mut self, name: &'static str, factory: ConnectorFactory) {
        if self.factories.insert(name, factory).is_some() {
            tracing::warn!(connector = name, "Replacing registered connector");
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.factories.keys().copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Builds the connector named by `settings.execution_connector`.
    pub fn create(&self, settings: &Settings) -> Result<Box<dyn Connector>, ConnectorError> {
        let name = settings.execution_connector.as_str();
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| ConnectorError::UnknownConnector(name.to_string()))?;
        let connector = factory(settings)?;
        tracing::info!(connector = connector.name(), "Execution connector ready");
        Ok(connector)
    }
}

impl Default for ConnectorRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// Copy of `params` with `final_output_dir` set.
pub(crate) fn with_output_dir(params: &Map<String, Value>, output_dir: &str) -> Map<String, Value> {
    let mut params = params.clone();
    params.insert(
        "final_output_dir".to_string(),
        Value::String(output_dir.to_string()),
    );
    params
}

pub(crate) fn render_params(params: &Map<String, Value>) -> Result<String, ConnectorError> {
    Ok(serde_json::to_string_pretty(params)?)
}

pub(crate) fn write_params(path: &Path, params: &Map<String, Value>) -> Result<(), ConnectorError> {
    fs::write(path, render_params(params)?).map_err(|e| ConnectorError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

pub(crate) fn create_dir(path: &Path) -> Result<(), ConnectorError> {
    fs::create_dir_all(path).map_err(|e| ConnectorError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Copies `input` into `dir`, keeping its file name.
pub(crate) fn copy_into(input: &Path, dir: &Path) -> Result<PathBuf, ConnectorError> {
    let name = input.file_name().ok_or_else(|| ConnectorError::Io {
        path: input.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "input has no file name"),
    })?;
    let dest = dir.join(name);
    fs::copy(input, &dest).map_err(|e| ConnectorError::Io {
        path: input.to_path_buf(),
        source: e,
    })?;
    Ok(dest)
}

/// Stages a job in a local directory the scheduler can read: creates
/// `job_dir`, writes the parameter file with `final_output_dir` pointing at
/// it and copies the input file in. Shared by `local` and `dummy`.
pub(crate) fn stage_locally(
    job_dir: &Path,
    params: &Map<String, Value>,
    input_file: Option<&Path>,
    dry_run: bool,
) -> Result<WorkingRef, ConnectorError> {
    let params_path = job_dir.join(PARAMS_FILE);
    let params = with_output_dir(params, &job_dir.to_string_lossy());

    if dry_run {
        tracing::info!(
            path = %params_path.display(),
            params = %render_params(&params)?,
            "[dry-run] would write parameter file"
        );
        if let Some(input) = input_file {
            tracing::info!(input = %input.display(), "[dry-run] would copy input file");
        }
        return Ok(params_path.into());
    }

    create_dir(job_dir)?;
    write_params(&params_path, &params)?;
    if let Some(input) = input_file {
        let dest = copy_into(input, job_dir)?;
        tracing::debug!(dest = %dest.display(), "Copied input file");
    }
    Ok(params_path.into())
}
