//! Shared helpers for efi-jobs integration tests.
//!
//! `TestHarness` owns a temporary directory with job, input and database
//! paths plus a settings file pointing at them.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{json, Value};
use tempfile::TempDir;

use efi_jobs::config::load_settings;
use efi_jobs::{ConnectorRegistry, Job, JobManager, JobStore, JobType, PassSummary, Settings, Status};

pub struct TestHarness {
    temp_dir: TempDir,
    pub job_dir: PathBuf,
    pub input_dir: PathBuf,
    pub settings_path: PathBuf,
    pub settings: Settings,
}

impl TestHarness {
    /// Harness running the `dummy` connector with default settings.
    pub fn new() -> Self {
        Self::with_settings(json!({}))
    }

    /// Harness whose settings file is the defaults merged with `overrides`.
    pub fn with_settings(overrides: Value) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = temp_dir.path();
        let job_dir = base.join("jobs");
        let input_dir = base.join("inputs");
        fs::create_dir_all(&input_dir).expect("Failed to create input directory");

        let mut document = json!({
            "version": "1.0",
            "database_path": base.join("jobs.db"),
            "execution_connector": "dummy",
            "local_job_directory": job_dir,
            "local_input_directory": input_dir,
            "max_running_jobs": 10
        });
        if let (Some(doc), Value::Object(extra)) = (document.as_object_mut(), overrides) {
            doc.extend(extra);
        }

        let settings_path = base.join("settings.json");
        fs::write(&settings_path, serde_json::to_string_pretty(&document).unwrap())
            .expect("Failed to write settings");
        let settings = load_settings(&settings_path).expect("Harness settings should load");

        Self {
            temp_dir,
            job_dir,
            input_dir,
            settings_path,
            settings,
        }
    }

    pub fn base(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Opens a store on the harness database, outside dry-run.
    pub fn store(&self) -> JobStore {
        JobStore::open(&self.settings.database_path, false).expect("Failed to open store")
    }

    pub fn seed(&self, jobs: &[Job]) {
        let store = self.store();
        for job in jobs {
            store.insert(job).expect("Failed to insert job");
        }
        store.close().expect("Failed to close store");
    }

    pub fn job(&self, id: i64) -> Job {
        let store = self.store();
        let job = store.find(id).unwrap().expect("Job should exist");
        store.close().unwrap();
        job
    }

    pub fn write_input(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.input_dir.join(name);
        fs::write(&path, contents).expect("Failed to write input file");
        path
    }

    /// Writes the pipeline's result file for a job.
    pub fn write_stats(&self, id: i64, stats: Value) {
        let dir = self.job_dir.join(id.to_string());
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("stats.json"), stats.to_string()).unwrap();
    }

    /// One full pass through a fresh manager, as the binary performs it.
    pub fn run_pass(&self) -> PassSummary {
        self.run_pass_with(&ConnectorRegistry::with_builtins())
    }

    pub fn run_pass_with(&self, registry: &ConnectorRegistry) -> PassSummary {
        let manager = JobManager::from_settings(&self.settings, registry)
            .expect("Manager should build from harness settings");
        let summary = manager.run_once().expect("Pass should succeed");
        manager.finish().expect("Failed to release store");
        summary
    }
}

/// A storable NEW job of the given type.
pub fn new_job(id: i64, job_type: JobType) -> Job {
    Job::new(id, job_type)
        .with("uuid", format!("00000000-0000-0000-0000-{:012}", id))
        .unwrap()
        .with("isPublic", false)
        .unwrap()
        .with("status", Status::NEW)
        .unwrap()
}

/// A NEW job that references an uploaded input file.
pub fn job_with_input(id: i64, job_type: JobType, filename: &str) -> Job {
    new_job(id, job_type).with("jobFilename", filename).unwrap()
}
