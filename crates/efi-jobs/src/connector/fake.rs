//! Scripted connector for unit tests.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::{Map, Value};

use super::{Connector, WorkingRef};
use crate::error::ConnectorError;
use crate::job::{Job, Pipeline, Status};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Prepare {
        job_id: i64,
        params: Map<String, Value>,
        input: Option<PathBuf>,
    },
    Submit {
        job_id: i64,
        working: String,
        pipeline: Pipeline,
    },
    Poll(i64),
    Retrieve(i64),
}

pub struct FakeConnector {
    pub prepare_ok: bool,
    pub handle: Option<i64>,
    pub status: Status,
    pub retrieve_ok: bool,
    calls: Mutex<Vec<Call>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self {
            prepare_ok: true,
            handle: Some(4242),
            status: Status::RUNNING,
            retrieve_ok: true,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn refused(what: &str) -> ConnectorError {
        ConnectorError::UnexpectedOutput {
            program: "fake".to_string(),
            output: what.to_string(),
        }
    }
}

impl Connector for FakeConnector {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn prepare_environment(
        &self,
        job_id: i64,
        params: &Map<String, Value>,
        input_file: Option<&Path>,
    ) -> Result<WorkingRef, ConnectorError> {
        self.record(Call::Prepare {
            job_id,
            params: params.clone(),
            input: input_file.map(Path::to_path_buf),
        });
        if self.prepare_ok {
            Ok(WorkingRef::new(format!("/jobs/{}/params.json", job_id)))
        } else {
            Err(Self::refused("prepare"))
        }
    }

    fn submit(
        &self,
        job_id: i64,
        working: &WorkingRef,
        pipeline: Pipeline,
    ) -> Result<i64, ConnectorError> {
        self.record(Call::Submit {
            job_id,
            working: working.to_string(),
            pipeline,
        });
        self.handle.ok_or_else(|| Self::refused("submit"))
    }

    fn poll_status(&self, scheduler_job_id: i64) -> Status {
        self.record(Call::Poll(scheduler_job_id));
        self.status
    }

    fn retrieve_results(&self, job: &Job) -> Result<(), ConnectorError> {
        self.record(Call::Retrieve(job.id()));
        if self.retrieve_ok {
            Ok(())
        } else {
            Err(Self::refused("retrieve"))
        }
    }
}
