//! Job records and the metadata that drives their (de)serialization.

pub mod enums;
pub mod metadata;
pub mod record;
pub mod status;
pub mod value;
pub mod variants;

use thiserror::Error;

pub use enums::{ImportMode, JobType, Pipeline};
pub use metadata::{FieldGroup, FieldInfo, FieldSpec, FieldTable, InfoKey};
pub use record::{Job, UpdateMap};
pub use status::Status;
pub use value::{FieldKind, FieldValue};
pub use variants::VariantSpec;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Invalid status '{0}'")]
    InvalidStatus(String),

    #[error("Status '{0}' cannot be stored")]
    UnstorableStatus(Status),

    #[error("Unknown job type '{0}'")]
    UnknownJobType(String),

    #[error("Job type '{job_type}' has no field '{field}'")]
    UnknownField { job_type: JobType, field: String },

    #[error("Field '{field}' expects {expected:?}, got {value}")]
    KindMismatch {
        field: String,
        expected: FieldKind,
        value: FieldValue,
    },
}
