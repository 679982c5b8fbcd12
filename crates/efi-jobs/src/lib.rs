pub mod config;
pub mod connector;
pub mod db;
pub mod engine;
pub mod error;
pub mod job;
pub mod logging;
pub mod results;

pub use config::{load_settings, load_settings_from_str, IncompleteResults, LogFormat, Settings};
pub use connector::{Connector, ConnectorRegistry, WorkingRef};
pub use db::{Database, DatabaseError, JobStore};
pub use engine::{JobHandler, JobManager, PassSummary};
pub use error::{
    ConfigError, ConnectorError, EngineError, LoggingError, Result, ResultsError,
};
pub use job::{FieldKind, FieldValue, Job, JobError, JobType, Pipeline, Status, UpdateMap};
pub use results::ResultsParser;
