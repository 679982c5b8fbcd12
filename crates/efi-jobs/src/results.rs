//! Reads the `stats.json` a pipeline leaves in the job directory and turns
//! it into field updates.

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::ResultsError;
use crate::job::{FieldValue, Job, UpdateMap};

/// Name of the result file inside a job's output directory.
pub const RESULT_FILE: &str = "stats.json";

pub struct ResultsParser {
    job_root: PathBuf,
}

impl ResultsParser {
    pub fn new(job_root: impl Into<PathBuf>) -> Self {
        Self {
            job_root: job_root.into(),
        }
    }

    pub fn result_path(&self, job: &Job) -> PathBuf {
        self.job_root.join(job.id().to_string()).join(RESULT_FILE)
    }

    /// Parses the job's result file.
    ///
    /// Keys are translated through the variant's result-key map; keys without
    /// a mapping pass through unchanged. Values of known fields are coerced to
    /// the field's kind; a value that cannot be coerced is dropped with a
    /// warning.
    pub fn parse(&self, job: &Job) -> Result<UpdateMap, ResultsError> {
        let path = self.result_path(job);
        let object = read_object(&path)?;
        let key_map = job.fields().result_key_map();

        let mut updates = UpdateMap::new();
        for (key, raw) in object {
            let name = key_map.get(key.as_str()).copied().unwrap_or(key.as_str());

            let value = match job.fields().get(name) {
                Some(spec) => match FieldValue::from_json(spec.kind, &raw) {
                    Some(FieldValue::Status(s)) if !s.is_storable() => None,
                    other => other,
                },
                None => Some(FieldValue::from_json_untyped(&raw)),
            };

            match value {
                Some(value) => {
                    updates.insert(name.to_string(), value);
                }
                None => tracing::warn!(
                    job_id = job.id(),
                    key = %key,
                    value = %raw,
                    "Dropping result value of the wrong type"
                ),
            }
        }

        tracing::debug!(job_id = job.id(), fields = updates.len(), "Parsed results");
        Ok(updates)
    }
}

fn read_object(path: &Path) -> Result<serde_json::Map<String, Value>, ResultsError> {
    if !path.is_file() {
        return Err(ResultsError::Missing {
            path: path.to_path_buf(),
        });
    }
    let content = std::fs::read_to_string(path).map_err(|e| ResultsError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;
    let value: Value = serde_json::from_str(&content).map_err(|e| ResultsError::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(ResultsError::NotAnObject {
            path: path.to_path_buf(),
        }),
    }
}
