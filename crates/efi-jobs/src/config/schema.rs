use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub version: String,
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    #[serde(default = "default_connector")]
    pub execution_connector: String,
    pub local_job_directory: PathBuf,
    pub local_input_directory: PathBuf,
    #[serde(default = "default_max_running_jobs")]
    pub max_running_jobs: u64,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
    #[serde(default)]
    pub incomplete_results: IncompleteResults,
    #[serde(default)]
    pub nextflow: NextflowSettings,
    #[serde(default)]
    pub slurm: SlurmSettings,
    #[serde(default)]
    pub hpc: Option<HpcSettings>,
    #[serde(default)]
    pub api: Option<ApiSettings>,
}

impl Settings {
    /// Where an uploaded input file named `filename` is expected.
    pub fn input_path(&self, filename: &str) -> PathBuf {
        self.local_input_directory.join(filename)
    }
}

fn default_database_path() -> PathBuf {
    crate::db::default_database_path().unwrap_or_else(|| PathBuf::from("jobs.db"))
}

fn default_connector() -> String {
    "local".to_string()
}

fn default_max_running_jobs() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Format of the log file. The console is always compact text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    /// JSON lines with span fields.
    Json,
}

/// What to do with a job the backend reports finished but whose results
/// could not be retrieved or parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncompleteResults {
    /// Keep FINISHED with whatever was parsed and log the failure.
    #[default]
    KeepFinished,
    /// Reclassify the job as FAILED.
    MarkFailed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NextflowSettings {
    #[serde(default = "default_nextflow")]
    pub executable: String,
    #[serde(default = "default_pipeline_dir")]
    pub pipeline_dir: PathBuf,
    #[serde(default = "default_config_dir")]
    pub config_dir: PathBuf,
    /// Fixed parameters merged into every job's parameter file.
    #[serde(default)]
    pub params: Map<String, Value>,
}

fn default_nextflow() -> String {
    "nextflow".to_string()
}

fn default_pipeline_dir() -> PathBuf {
    PathBuf::from("/opt/efi-nf/pipelines")
}

fn default_config_dir() -> PathBuf {
    PathBuf::from("/opt/efi-nf/conf")
}

impl Default for NextflowSettings {
    fn default() -> Self {
        Self {
            executable: default_nextflow(),
            pipeline_dir: default_pipeline_dir(),
            config_dir: default_config_dir(),
            params: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlurmSettings {
    #[serde(default = "default_partition")]
    pub partition: String,
    #[serde(default = "default_memory")]
    pub memory: String,
    #[serde(default = "default_one")]
    pub cpus_per_task: u32,
    #[serde(default = "default_one")]
    pub ntasks: u32,
}

fn default_partition() -> String {
    "efi".to_string()
}

fn default_memory() -> String {
    "24GB".to_string()
}

fn default_one() -> u32 {
    1
}

impl Default for SlurmSettings {
    fn default() -> Self {
        Self {
            partition: default_partition(),
            memory: default_memory(),
            cpus_per_task: 1,
            ntasks: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HpcSettings {
    pub hostname: String,
    pub username: String,
    pub ssh_key_path: PathBuf,
    pub remote_job_directory: PathBuf,
}

impl HpcSettings {
    /// `user@host` target for ssh and scp.
    pub fn destination(&self) -> String {
        format!("{}@{}", self.username, self.hostname)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSettings {
    pub base_url: String,
    #[serde(default = "default_upload_hook")]
    pub upload_hook: String,
    #[serde(default = "default_submit_hook")]
    pub submit_hook: String,
    #[serde(default = "default_status_hook")]
    pub status_hook: String,
    #[serde(default = "default_download_hook")]
    pub download_hook: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ApiSettings {
    /// Joins a hook onto the base URL.
    pub fn url(&self, hook: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            hook.trim_start_matches('/')
        )
    }
}

fn default_upload_hook() -> String {
    "upload".to_string()
}

fn default_submit_hook() -> String {
    "submit".to_string()
}

fn default_status_hook() -> String {
    "status".to_string()
}

fn default_download_hook() -> String {
    "download".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}
