//! Backend for a compute resource fronted by an HTTP API.
//!
//! Staging uploads a zip of the parameter file and the input file; results
//! come back as a zip that is unpacked into the local job directory.

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use serde_json::{json, Map, Value};
use zip::write::SimpleFileOptions;

use super::slurm::map_state;
use super::{create_dir, render_params, with_output_dir, Connector, WorkingRef, PARAMS_FILE};
use crate::config::{ApiSettings, Settings};
use crate::error::ConnectorError;
use crate::job::{Job, Pipeline, Status};

const FILENAME_HEADER: &str = "X-Filename";

pub struct ApiConnector {
    api: ApiSettings,
    local_root: PathBuf,
    client: Client,
    dry_run: bool,
}

impl ApiConnector {
    pub fn new(settings: &Settings) -> Result<Self, ConnectorError> {
        let api = settings
            .api
            .clone()
            .ok_or(ConnectorError::MissingSettings {
                connector: "api",
                section: "api",
            })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(api.timeout_secs))
            .default_headers(header_map(&api)?)
            .build()?;

        Ok(Self {
            api,
            local_root: settings.local_job_directory.clone(),
            client,
            dry_run: settings.dry_run,
        })
    }

    fn check(url: &str, response: Response) -> Result<Response, ConnectorError> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(ConnectorError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            })
        }
    }

    fn post_json(&self, hook: &str, body: &Value) -> Result<Value, ConnectorError> {
        let url = self.api.url(hook);
        let response = self.client.post(&url).json(body).send()?;
        Ok(Self::check(&url, response)?.json()?)
    }

    fn download_url(&self, job_id: i64) -> String {
        self.api
            .url(&format!("{}/{}/results.zip", self.api.download_hook, job_id))
    }
}

fn header_map(api: &ApiSettings) -> Result<HeaderMap, ConnectorError> {
    let mut headers = HeaderMap::new();
    for (name, value) in &api.headers {
        let invalid = || ConnectorError::InvalidHeader { name: name.clone() };
        let key = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
        let value = HeaderValue::from_str(value).map_err(|_| invalid())?;
        headers.insert(key, value);
    }
    Ok(headers)
}

/// Builds an in-memory zip holding `params.json` and the optional input.
fn bundle(params_json: &str, input_file: Option<&Path>) -> Result<Vec<u8>, ConnectorError> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |e: std::io::Error| ConnectorError::Io { path, source: e }
    };

    zip.start_file(PARAMS_FILE, options)?;
    zip.write_all(params_json.as_bytes())
        .map_err(io_err(Path::new(PARAMS_FILE)))?;

    if let Some(input) = input_file {
        let name = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "input".to_string());
        let bytes = std::fs::read(input).map_err(io_err(input))?;
        zip.start_file(name, options)?;
        zip.write_all(&bytes).map_err(io_err(input))?;
    }

    Ok(zip.finish()?.into_inner())
}

fn unpack(bytes: Vec<u8>, dest: &Path) -> Result<(), ConnectorError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    archive.extract(dest)?;
    Ok(())
}

impl Connector for ApiConnector {
    fn name(&self) -> &'static str {
        "api"
    }

    fn prepare_environment(
        &self,
        job_id: i64,
        params: &Map<String, Value>,
        input_file: Option<&Path>,
    ) -> Result<WorkingRef, ConnectorError> {
        let archive_name = format!("job_{}.zip", job_id);
        let params = with_output_dir(params, "output");
        let params_json = render_params(&params)?;

        if self.dry_run {
            tracing::info!(
                url = %self.api.url(&self.api.upload_hook),
                archive = %archive_name,
                params = %params_json,
                "[dry-run] would upload job bundle"
            );
            return Ok(WorkingRef::new(archive_name));
        }

        let body = bundle(&params_json, input_file)?;
        let url = self.api.url(&self.api.upload_hook);
        let response = self
            .client
            .post(&url)
            .header(FILENAME_HEADER, &archive_name)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(body)
            .send()?;
        let text = Self::check(&url, response)?.text()?;

        // The API answers with the stored location; fall back to the name we sent.
        let location = text.trim();
        if location.is_empty() {
            Ok(WorkingRef::new(archive_name))
        } else {
            Ok(WorkingRef::new(location))
        }
    }

    fn submit(
        &self,
        job_id: i64,
        working: &WorkingRef,
        pipeline: Pipeline,
    ) -> Result<i64, ConnectorError> {
        let body = json!({
            "job_id": job_id,
            "pipeline": pipeline.as_str(),
            "bundle": working.as_str(),
        });

        if self.dry_run {
            tracing::info!(url = %self.api.url(&self.api.submit_hook), %body, "[dry-run] would submit");
            return Ok(job_id);
        }

        let reply = self.post_json(&self.api.submit_hook, &body)?;
        reply
            .get("scheduler_id")
            .and_then(|v| v.as_i64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
            .ok_or_else(|| ConnectorError::UnexpectedOutput {
                program: self.api.url(&self.api.submit_hook),
                output: reply.to_string(),
            })
    }

    fn poll_status(&self, scheduler_job_id: i64) -> Status {
        if self.dry_run {
            return Status::FINISHED;
        }

        match self.post_json(&self.api.status_hook, &json!({ "job_id": scheduler_job_id })) {
            Ok(reply) => reply
                .get("status")
                .and_then(Value::as_str)
                .map(map_state)
                .unwrap_or(Status::UNKNOWN),
            Err(e) => {
                tracing::warn!(scheduler_job_id, error = %e, "Status request failed");
                Status::UNKNOWN
            }
        }
    }

    fn retrieve_results(&self, job: &Job) -> Result<(), ConnectorError> {
        let url = self.download_url(job.id());
        let local_dir = self.local_root.join(job.id().to_string());

        if self.dry_run {
            tracing::info!(%url, local = %local_dir.display(), "[dry-run] would download results");
            return Ok(());
        }

        let response = self.client.get(&url).send()?;
        let bytes = Self::check(&url, response)?.bytes()?;
        create_dir(&local_dir)?;
        unpack(bytes.to_vec(), &local_dir)?;
        tracing::debug!(job_id = job.id(), local = %local_dir.display(), "Unpacked results");
        Ok(())
    }
}
