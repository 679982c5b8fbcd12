use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use super::metadata::{FieldTable, InfoKey};
use super::variants::VariantSpec;
use super::{FieldValue, ImportMode, JobError, JobType, Pipeline, Status};

/// Field name -> new value, produced by the engine and applied by the store.
pub type UpdateMap = BTreeMap<String, FieldValue>;

/// One job row. Every column of the variant's field table is addressable by
/// name; the typed accessors below are conveniences over [`Job::get`].
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    job_type: JobType,
    values: BTreeMap<&'static str, FieldValue>,
}

static NULL: FieldValue = FieldValue::Null;

impl Job {
    /// Creates a `NEW` job of the given type with every other field null.
    pub fn new(id: i64, job_type: JobType) -> Self {
        let mut values: BTreeMap<&'static str, FieldValue> = job_type
            .spec()
            .fields
            .iter()
            .map(|f| (f.name, FieldValue::Null))
            .collect();
        values.insert("id", FieldValue::Int(id));
        values.insert("jobType", FieldValue::Text(job_type.as_str().to_string()));
        values.insert("status", FieldValue::Status(Status::NEW));
        Self { job_type, values }
    }

    /// Builder-style [`Job::set`] for fixtures and seeding.
    pub fn with(mut self, name: &str, value: impl Into<FieldValue>) -> Result<Self, JobError> {
        self.set(name, value)?;
        Ok(self)
    }

    /// Sets a declared field. The value must fit the field's kind and a
    /// status must be a storable primitive.
    pub fn set(&mut self, name: &str, value: impl Into<FieldValue>) -> Result<(), JobError> {
        let value = value.into();
        let spec = self
            .fields()
            .get(name)
            .ok_or_else(|| JobError::UnknownField {
                job_type: self.job_type,
                field: name.to_string(),
            })?;
        if !value.fits(spec.kind) {
            return Err(JobError::KindMismatch {
                field: name.to_string(),
                expected: spec.kind,
                value,
            });
        }
        if let FieldValue::Status(status) = value {
            if !status.is_storable() {
                return Err(JobError::UnstorableStatus(status));
            }
        }
        let name = spec.name;
        self.values.insert(name, value);
        Ok(())
    }

    /// Value of a field, `Null` for unset or undeclared names.
    pub fn get(&self, name: &str) -> &FieldValue {
        self.values.get(name).unwrap_or(&NULL)
    }

    pub fn spec(&self) -> &'static VariantSpec {
        self.job_type.spec()
    }

    pub fn fields(&self) -> &'static FieldTable {
        &self.job_type.spec().fields
    }

    pub fn id(&self) -> i64 {
        self.get("id").as_i64().unwrap_or_default()
    }

    pub fn job_type(&self) -> JobType {
        self.job_type
    }

    pub fn pipeline(&self) -> Pipeline {
        self.job_type.pipeline()
    }

    pub fn import_mode(&self) -> Option<ImportMode> {
        self.job_type.import_mode()
    }

    pub fn status(&self) -> Status {
        self.get("status").as_status().unwrap_or(Status::UNKNOWN)
    }

    pub fn scheduler_job_id(&self) -> Option<i64> {
        self.get("schedulerJobId").as_i64()
    }

    pub fn job_filename(&self) -> Option<&str> {
        self.get("jobFilename").as_str()
    }

    pub fn time_created(&self) -> Option<DateTime<Utc>> {
        self.get("timeCreated").as_time()
    }

    pub fn time_started(&self) -> Option<DateTime<Utc>> {
        self.get("timeStarted").as_time()
    }

    pub fn time_completed(&self) -> Option<DateTime<Utc>> {
        self.get("timeCompleted").as_time()
    }

    pub fn parent_job_id(&self) -> Option<i64> {
        self.get("parentJobId").as_i64()
    }

    /// External parameter name -> current value for every parameter field.
    ///
    /// When two fields share a parameter name, a null value never replaces
    /// a set one; otherwise the later declaration wins.
    pub fn parameters(&self) -> Map<String, Value> {
        let mut params = Map::new();
        for field in self.fields().fields_with(InfoKey::IsParameter) {
            let key = field.external_parameter_name();
            let value = self.get(field.name).to_json();
            if value.is_null() && params.contains_key(key) {
                continue;
            }
            params.insert(key.to_string(), value);
        }
        params
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<Job id={} type={} status={}",
            self.id(),
            self.job_type,
            self.status()
        )?;
        if let Some(t) = self.time_started() {
            write!(f, " started={}", t.to_rfc3339())?;
        }
        if let Some(t) = self.time_completed() {
            write!(f, " completed={}", t.to_rfc3339())?;
        }
        f.write_str(">")
    }
}
