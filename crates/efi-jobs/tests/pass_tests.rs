//! End-to-end passes over a file-backed store with the built-in `dummy`
//! connector and a few scripted ones.

mod common;

use std::fs;
use std::path::Path;

use serde_json::{json, Map, Value};

use common::{job_with_input, new_job, TestHarness};
use efi_jobs::connector::ConnectorFactory;
use efi_jobs::error::ConnectorError;
use efi_jobs::{
    Connector, ConnectorRegistry, FieldValue, Job, JobManager, JobType, Pipeline, Status, WorkingRef,
};

/// Stages nothing and rejects every submission.
struct RejectingConnector;

impl Connector for RejectingConnector {
    fn name(&self) -> &'static str {
        "rejecting"
    }

    fn prepare_environment(
        &self,
        job_id: i64,
        _params: &Map<String, Value>,
        _input_file: Option<&Path>,
    ) -> Result<WorkingRef, ConnectorError> {
        Ok(WorkingRef::new(format!("/nowhere/{}", job_id)))
    }

    fn submit(&self, _: i64, _: &WorkingRef, _: Pipeline) -> Result<i64, ConnectorError> {
        Err(ConnectorError::CommandFailed {
            program: "sbatch".to_string(),
            status: "exit status: 1".to_string(),
            stderr: "partition unavailable".to_string(),
        })
    }

    fn poll_status(&self, _: i64) -> Status {
        Status::UNKNOWN
    }

    fn retrieve_results(&self, _: &Job) -> Result<(), ConnectorError> {
        Ok(())
    }
}

/// Reports every job as failed on the compute resource.
struct FailingBackend;

impl Connector for FailingBackend {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn prepare_environment(
        &self,
        job_id: i64,
        _params: &Map<String, Value>,
        _input_file: Option<&Path>,
    ) -> Result<WorkingRef, ConnectorError> {
        Ok(WorkingRef::new(format!("/nowhere/{}", job_id)))
    }

    fn submit(&self, job_id: i64, _: &WorkingRef, _: Pipeline) -> Result<i64, ConnectorError> {
        Ok(job_id + 1000)
    }

    fn poll_status(&self, _: i64) -> Status {
        Status::FAILED
    }

    fn retrieve_results(&self, _: &Job) -> Result<(), ConnectorError> {
        Ok(())
    }
}

fn registry_with(name: &'static str, factory: ConnectorFactory) -> ConnectorRegistry {
    let mut registry = ConnectorRegistry::with_builtins();
    registry.register(name, factory);
    registry
}

#[test]
fn test_job_runs_to_completion_with_results() {
    let harness = TestHarness::new();
    harness.write_input("ids.txt", "P12345\nQ67890\n");
    harness.seed(&[job_with_input(1, JobType::EstGenerateAccession, "ids.txt")]);

    let first = harness.run_pass();
    assert_eq!(first.started, 1);

    let job = harness.job(1);
    assert_eq!(job.status(), Status::RUNNING);
    assert_eq!(job.scheduler_job_id(), Some(1));
    assert!(job.time_started().is_some());

    let staged = harness.job_dir.join("1");
    assert!(staged.join("ids.txt").is_file());
    let params: Value =
        serde_json::from_str(&fs::read_to_string(staged.join("params.json")).unwrap()).unwrap();
    assert_eq!(params["job_id"], json!(1));
    assert_eq!(params["import_mode"], json!("accession"));
    assert_eq!(params["final_output_dir"], json!(staged.to_string_lossy()));
    assert!(params["filter"].is_array());

    harness.write_stats(1, json!({"num_matched": 10, "num_unmatched": 2}));
    let second = harness.run_pass();
    assert_eq!(second.polled, 1);
    assert_eq!(second.advanced, 1);

    let job = harness.job(1);
    assert_eq!(job.status(), Status::FINISHED);
    assert!(job.time_completed().is_some());
    assert_eq!(job.get("numMatchedIds"), &FieldValue::Int(10));
    assert_eq!(job.get("numUnmatchedIds"), &FieldValue::Int(2));
}

#[test]
fn test_missing_input_file_fails_job_without_staging() {
    let harness = TestHarness::new();
    harness.seed(&[job_with_input(1, JobType::EstColorSsn, "absent.xgmml")]);

    harness.run_pass();

    let job = harness.job(1);
    assert_eq!(job.status(), Status::FAILED);
    assert!(job.scheduler_job_id().is_none());
    assert!(!harness.job_dir.join("1").exists());
}

#[test]
fn test_missing_results_follow_incomplete_results_policy() {
    struct Case {
        name: &'static str,
        policy: &'static str,
        expected: Status,
    }
    let cases = [
        Case {
            name: "keep_finished",
            policy: "keep_finished",
            expected: Status::FINISHED,
        },
        Case {
            name: "mark_failed",
            policy: "mark_failed",
            expected: Status::FAILED,
        },
    ];

    for case in cases {
        let harness = TestHarness::with_settings(json!({"incomplete_results": case.policy}));
        harness.seed(&[new_job(1, JobType::EstGenerateFamilies)]);

        harness.run_pass();
        harness.run_pass();

        let job = harness.job(1);
        assert_eq!(job.status(), case.expected, "case {}", case.name);
        assert!(job.time_completed().is_some(), "case {}", case.name);
    }
}

#[test]
fn test_capacity_limits_jobs_started_per_pass() {
    let harness = TestHarness::with_settings(json!({"max_running_jobs": 2}));
    harness.seed(&[
        new_job(1, JobType::EstGenerateFamilies),
        new_job(2, JobType::EstGenerateFamilies),
        new_job(3, JobType::EstGenerateFamilies),
    ]);

    let summary = harness.run_pass();
    assert_eq!(summary.started, 2);
    assert_eq!(harness.job(1).status(), Status::RUNNING);
    assert_eq!(harness.job(2).status(), Status::RUNNING);
    assert_eq!(harness.job(3).status(), Status::NEW);

    // Both finish on the next poll, which frees the slots for job 3.
    let summary = harness.run_pass();
    assert_eq!(summary.running, 0);
    assert_eq!(summary.started, 1);
    assert_eq!(harness.job(3).status(), Status::RUNNING);
}

#[test]
fn test_dry_run_leaves_store_and_filesystem_untouched() {
    let harness = TestHarness::with_settings(json!({"dry_run": true}));
    harness.seed(&[new_job(1, JobType::EstGenerateFamilies)]);
    let before = std::fs::read(&harness.settings.database_path).unwrap();

    let summary = harness.run_pass();
    assert_eq!(summary.started, 1);
    assert_eq!(std::fs::read(&harness.settings.database_path).unwrap(), before);

    let job = harness.job(1);
    assert_eq!(job.status(), Status::NEW);
    assert!(job.scheduler_job_id().is_none());
    assert!(!harness.job_dir.join("1").exists());
}

#[test]
fn test_submit_failure_marks_job_failed() {
    let harness = TestHarness::with_settings(json!({"execution_connector": "rejecting"}));
    harness.seed(&[new_job(1, JobType::EstGenerateFamilies)]);

    harness.run_pass_with(&registry_with("rejecting", |_| Ok(Box::new(RejectingConnector))));

    let job = harness.job(1);
    assert_eq!(job.status(), Status::FAILED);
    assert!(job.time_started().is_none());
}

#[test]
fn test_backend_failure_completes_job_as_failed() {
    let harness = TestHarness::with_settings(json!({"execution_connector": "failing"}));
    harness.seed(&[new_job(7, JobType::GntGnn)]);
    let registry = registry_with("failing", |_| Ok(Box::new(FailingBackend)));

    harness.run_pass_with(&registry);
    assert_eq!(harness.job(7).scheduler_job_id(), Some(1007));

    harness.run_pass_with(&registry);
    let job = harness.job(7);
    assert_eq!(job.status(), Status::FAILED);
    assert!(job.time_completed().is_some());
}

#[test]
fn test_finished_and_failed_jobs_are_not_touched() {
    let harness = TestHarness::new();
    let finished = new_job(1, JobType::EstGenerateFamilies)
        .with("status", Status::FINISHED)
        .unwrap();
    let failed = new_job(2, JobType::EstGenerateFamilies)
        .with("status", Status::FAILED)
        .unwrap();
    harness.seed(&[finished, failed]);

    let summary = harness.run_pass();
    assert_eq!(summary.polled, 0);
    assert_eq!(summary.started, 0);
    assert_eq!(harness.job(1).status(), Status::FINISHED);
    assert_eq!(harness.job(2).status(), Status::FAILED);
}

#[test]
fn test_unknown_connector_is_a_startup_error() {
    let harness = TestHarness::with_settings(json!({"execution_connector": "cloud"}));
    let err = JobManager::from_settings(&harness.settings, &ConnectorRegistry::with_builtins())
        .err()
        .expect("Unknown connector should fail");
    assert!(err.to_string().contains("cloud"));
}
