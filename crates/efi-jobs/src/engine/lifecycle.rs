//! Per-job state transitions.
//!
//! Both entry points return the update map for one job and never touch the
//! store. Connector and parser failures end up in that map; nothing here
//! returns an error.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};

use crate::config::{IncompleteResults, Settings};
use crate::connector::Connector;
use crate::job::{FieldValue, Job, Status, UpdateMap};
use crate::results::ResultsParser;

pub struct JobHandler {
    connector: Arc<dyn Connector>,
    parser: ResultsParser,
    settings: Settings,
}

fn update(entries: &[(&str, FieldValue)]) -> UpdateMap {
    entries
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

fn failed() -> UpdateMap {
    update(&[("status", Status::FAILED.into())])
}

fn completed(status: Status) -> UpdateMap {
    update(&[
        ("status", status.into()),
        ("timeCompleted", Utc::now().into()),
    ])
}

impl JobHandler {
    pub fn new(connector: Arc<dyn Connector>, settings: &Settings) -> Self {
        Self {
            connector,
            parser: ResultsParser::new(&settings.local_job_directory),
            settings: settings.clone(),
        }
    }

    pub fn connector(&self) -> &dyn Connector {
        self.connector.as_ref()
    }

    /// The parameter map handed to the pipeline: the job's own parameters,
    /// the fixed pipeline settings, the import mode and, for pipelines that
    /// take one, the composite filter list.
    pub fn parameters_for(&self, job: &Job) -> Map<String, Value> {
        let mut params = job.parameters();
        params.extend(self.settings.nextflow.params.clone());
        if let Some(mode) = job.import_mode() {
            params.insert(
                "import_mode".to_string(),
                Value::String(mode.as_str().to_string()),
            );
        }
        if job.pipeline().uses_composite_filter() {
            job.fields().fold_filters(&mut params);
        }
        params
    }

    /// Stages and submits a `NEW` job.
    ///
    /// Any failure (missing input file, staging, submission) yields
    /// `{status: FAILED}` without calling later steps.
    pub fn start_new_job(&self, job: &Job) -> UpdateMap {
        let input = match job.job_filename() {
            Some(name) if job.spec().takes_input_file() => {
                let path = self.settings.input_path(name);
                if !path.is_file() {
                    tracing::error!(path = %path.display(), "Input file not found");
                    return failed();
                }
                Some(path)
            }
            _ => None,
        };

        let params = self.parameters_for(job);
        let working = match self
            .connector
            .prepare_environment(job.id(), &params, input.as_deref())
        {
            Ok(working) => working,
            Err(e) => {
                tracing::error!(error = %e, "Failed to prepare job environment");
                return failed();
            }
        };

        match self.connector.submit(job.id(), &working, job.pipeline()) {
            Ok(handle) => {
                tracing::info!(scheduler_job_id = handle, "Job submitted, now running");
                update(&[
                    ("status", Status::RUNNING.into()),
                    ("schedulerJobId", handle.into()),
                    ("timeStarted", Utc::now().into()),
                ])
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to submit job");
                failed()
            }
        }
    }

    /// Polls a `RUNNING` job and returns what changed. Still-running and
    /// unknown states produce an empty map.
    pub fn advance_running_job(&self, job: &Job) -> UpdateMap {
        let Some(handle) = job.scheduler_job_id() else {
            tracing::error!("Running job has no scheduler id and cannot be polled");
            return completed(Status::FAILED);
        };

        let status = self.connector.poll_status(handle);
        if status == Status::RUNNING {
            tracing::debug!(scheduler_job_id = handle, "Job still running");
            UpdateMap::new()
        } else if status == Status::FAILED {
            tracing::info!(scheduler_job_id = handle, "Job failed on the compute resource");
            completed(Status::FAILED)
        } else if status == Status::FINISHED {
            tracing::info!(scheduler_job_id = handle, "Job finished");
            self.collect_results(job)
        } else {
            tracing::warn!(scheduler_job_id = handle, %status, "Unrecognized job status; leaving as running");
            UpdateMap::new()
        }
    }

    fn collect_results(&self, job: &Job) -> UpdateMap {
        let mut updates = completed(Status::FINISHED);

        let parsed = match self.connector.retrieve_results(job) {
            Ok(()) => self.parser.parse(job).map_err(|e| e.to_string()),
            Err(e) => Err(format!("result retrieval failed: {}", e)),
        };

        match parsed {
            Ok(fields) => updates.extend(fields),
            Err(reason) => {
                tracing::error!(%reason, policy = ?self.settings.incomplete_results, "Results are incomplete");
                if self.settings.incomplete_results == IncompleteResults::MarkFailed {
                    updates.insert("status".to_string(), Status::FAILED.into());
                }
            }
        }
        updates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_settings_from_str;
    use crate::connector::fake::{Call, FakeConnector};
    use crate::job::JobType;
    use serde_json::json;
    use std::fs;
    use std::path::Path;

    struct Fixture {
        dir: tempfile::TempDir,
        fake: Arc<FakeConnector>,
    }

    impl Fixture {
        fn new(fake: FakeConnector) -> Self {
            let dir = tempfile::tempdir().unwrap();
            fs::create_dir_all(dir.path().join("jobs")).unwrap();
            fs::create_dir_all(dir.path().join("inputs")).unwrap();
            Self {
                dir,
                fake: Arc::new(fake),
            }
        }

        fn handler(&self, extra: &str) -> JobHandler {
            let settings = load_settings_from_str(&format!(
                r#"{{
                    "version": "1.0",
                    "local_job_directory": "{}",
                    "local_input_directory": "{}"
                    {}
                }}"#,
                self.dir.path().join("jobs").display(),
                self.dir.path().join("inputs").display(),
                extra
            ))
            .unwrap();
            JobHandler::new(self.fake.clone(), &settings)
        }

        fn inputs(&self) -> std::path::PathBuf {
            self.dir.path().join("inputs")
        }

        fn write_stats(&self, id: i64, content: &str) {
            let dir = self.dir.path().join("jobs").join(id.to_string());
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("stats.json"), content).unwrap();
        }
    }

    fn status_of(updates: &UpdateMap) -> Option<Status> {
        updates.get("status").and_then(FieldValue::as_status)
    }

    #[test]
    fn test_missing_input_fails_without_connector_calls() {
        let fx = Fixture::new(FakeConnector::new());
        let job = Job::new(7, JobType::EstColorSsn)
            .with("jobFilename", "x.fa")
            .unwrap();

        let updates = fx.handler("").start_new_job(&job);

        assert_eq!(updates, failed());
        assert!(fx.fake.calls().is_empty());
    }

    #[test]
    fn test_happy_path_start() {
        let fx = Fixture::new(FakeConnector::new());
        let job = Job::new(8, JobType::GntGnn);

        let before = Utc::now();
        let updates = fx.handler("").start_new_job(&job);

        assert_eq!(updates.len(), 3);
        assert_eq!(status_of(&updates), Some(Status::RUNNING));
        assert_eq!(updates.get("schedulerJobId"), Some(&FieldValue::Int(4242)));
        let started = updates.get("timeStarted").and_then(FieldValue::as_time).unwrap();
        assert!(started >= before);

        let calls = fx.fake.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(
            calls[1],
            Call::Submit {
                job_id: 8,
                working: "/jobs/8/params.json".to_string(),
                pipeline: crate::job::Pipeline::Gnt,
            }
        );
    }

    #[test]
    fn test_input_file_is_passed_to_prepare() {
        let fx = Fixture::new(FakeConnector::new());
        fs::write(fx.inputs().join("ssn.zip"), b"PK").unwrap();
        let job = Job::new(5, JobType::EstColorSsn)
            .with("jobFilename", "ssn.zip")
            .unwrap();

        fx.handler("").start_new_job(&job);

        match &fx.fake.calls()[0] {
            Call::Prepare { input, .. } => {
                assert_eq!(input.as_deref(), Some(fx.inputs().join("ssn.zip").as_path()))
            }
            other => panic!("Expected Prepare, got {:?}", other),
        }
    }

    #[test]
    fn test_prepare_failure_skips_submit() {
        let mut fake = FakeConnector::new();
        fake.prepare_ok = false;
        let fx = Fixture::new(fake);

        let updates = fx.handler("").start_new_job(&Job::new(3, JobType::GntGnn));

        assert_eq!(updates, failed());
        assert_eq!(fx.fake.calls().len(), 1);
    }

    #[test]
    fn test_submit_failure_fails_job() {
        let mut fake = FakeConnector::new();
        fake.handle = None;
        let fx = Fixture::new(fake);

        let updates = fx.handler("").start_new_job(&Job::new(3, JobType::GntGnn));
        assert_eq!(updates, failed());
        assert!(!updates.contains_key("schedulerJobId"));
    }

    #[test]
    fn test_parameters_for_composite_filter_pipeline() {
        let fx = Fixture::new(FakeConnector::new());
        let handler = fx.handler(r#", "nextflow": { "params": { "blast_num_cpus": 16 } }"#);
        let job = Job::new(11, JobType::EstGenerateFamilies)
            .with("families", "PF05544")
            .unwrap()
            .with("excludeFragments", true)
            .unwrap()
            .with("taxSearch", "Bacteria")
            .unwrap();

        let params = handler.parameters_for(&job);

        assert_eq!(params["job_id"], json!(11));
        assert_eq!(params["families"], json!("PF05544"));
        assert_eq!(params["blast_num_cpus"], json!(16));
        assert_eq!(params["import_mode"], json!("families"));
        assert_eq!(
            params["filter"],
            json!(["fragment=true", "taxonomy=Bacteria"])
        );
        assert!(!params.contains_key("fragment"));
        assert!(!params.contains_key("taxonomy"));
    }

    #[test]
    fn test_parameters_for_plain_pipeline_keep_filters() {
        let fx = Fixture::new(FakeConnector::new());
        let job = Job::new(12, JobType::EstSsnFinalization)
            .with("excludeFragments", false)
            .unwrap();

        let params = fx.handler("").parameters_for(&job);

        assert_eq!(params["fragment"], json!(false));
        assert!(!params.contains_key("filter"));
        assert!(!params.contains_key("import_mode"));
    }

    fn running(id: i64, job_type: JobType) -> Job {
        Job::new(id, job_type)
            .with("status", Status::RUNNING)
            .unwrap()
            .with("schedulerJobId", 4242)
            .unwrap()
    }

    #[test]
    fn test_completion_merges_parsed_results() {
        let mut fake = FakeConnector::new();
        fake.status = Status::FINISHED;
        let fx = Fixture::new(fake);
        fx.write_stats(9, r#"{"num_matched": 10}"#);

        let updates = fx
            .handler("")
            .advance_running_job(&running(9, JobType::EstGenerateFasta));

        assert_eq!(updates.len(), 3);
        assert_eq!(status_of(&updates), Some(Status::FINISHED));
        assert_eq!(updates.get("numMatchedIds"), Some(&FieldValue::Int(10)));
        assert!(updates.get("timeCompleted").and_then(FieldValue::as_time).is_some());
        assert_eq!(
            fx.fake.calls(),
            vec![Call::Poll(4242), Call::Retrieve(9)]
        );
    }

    #[test]
    fn test_still_running_and_unknown_emit_nothing() {
        for status in [Status::RUNNING, Status::UNKNOWN] {
            let mut fake = FakeConnector::new();
            fake.status = status;
            let fx = Fixture::new(fake);
            let updates = fx
                .handler("")
                .advance_running_job(&running(1, JobType::GntGnn));
            assert!(updates.is_empty(), "{} produced {:?}", status, updates);
        }
    }

    #[test]
    fn test_backend_failure() {
        let mut fake = FakeConnector::new();
        fake.status = Status::FAILED;
        let fx = Fixture::new(fake);

        let updates = fx
            .handler("")
            .advance_running_job(&running(1, JobType::GntGnn));

        assert_eq!(status_of(&updates), Some(Status::FAILED));
        assert!(updates.contains_key("timeCompleted"));
        assert_eq!(fx.fake.calls(), vec![Call::Poll(4242)]);
    }

    #[test]
    fn test_missing_results_keep_finished_by_default() {
        let mut fake = FakeConnector::new();
        fake.status = Status::FINISHED;
        let fx = Fixture::new(fake);

        let updates = fx
            .handler("")
            .advance_running_job(&running(2, JobType::GntGnn));

        assert_eq!(status_of(&updates), Some(Status::FINISHED));
        assert!(updates.contains_key("timeCompleted"));
    }

    #[test]
    fn test_missing_results_mark_failed_policy() {
        let mut fake = FakeConnector::new();
        fake.status = Status::FINISHED;
        fake.retrieve_ok = false;
        let fx = Fixture::new(fake);
        fx.write_stats(2, r#"{"num_matched": 1}"#);

        let updates = fx
            .handler(r#", "incomplete_results": "mark_failed""#)
            .advance_running_job(&running(2, JobType::EstGenerateFasta));

        assert_eq!(status_of(&updates), Some(Status::FAILED));
        assert!(!updates.contains_key("numMatchedIds"));
    }

    #[test]
    fn test_running_without_handle_fails() {
        let fx = Fixture::new(FakeConnector::new());
        let job = Job::new(6, JobType::GntGnn)
            .with("status", Status::RUNNING)
            .unwrap();

        let updates = fx.handler("").advance_running_job(&job);

        assert_eq!(status_of(&updates), Some(Status::FAILED));
        assert!(fx.fake.calls().is_empty());
    }

    #[test]
    fn test_handler_exposes_connector() {
        let fx = Fixture::new(FakeConnector::new());
        assert_eq!(fx.handler("").connector().name(), "fake");
        assert!(Path::new(&fx.inputs()).is_dir());
    }
}
