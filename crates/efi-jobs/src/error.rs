use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Connector error: {0}")]
    Connector(#[from] ConnectorError),

    #[error("Job error: {0}")]
    Job(#[from] crate::job::JobError),

    #[error("Logging error: {0}")]
    Logging(#[from] LoggingError),
}

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Invalid log filter '{filter}': {reason}")]
    InvalidFilter { filter: String, reason: String },

    #[error("Failed to open log file '{path}': {source}")]
    OpenFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("A global subscriber is already installed")]
    AlreadyInitialized,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("No home directory to resolve the default settings path")]
    NoHomeDirectory,
}

#[derive(Error, Debug)]
pub enum ConnectorError {
    #[error("Unknown execution connector '{0}'")]
    UnknownConnector(String),

    #[error("Connector '{connector}' needs the '{section}' settings section")]
    MissingSettings {
        connector: &'static str,
        section: &'static str,
    },

    #[error("IO error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to run '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' exited with {status}: {stderr}")]
    CommandFailed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("Unexpected output from '{program}': {output}")]
    UnexpectedOutput { program: String, output: String },

    #[error("Failed to serialize parameters: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Invalid HTTP header '{name}'")]
    InvalidHeader { name: String },

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
}

#[derive(Error, Debug)]
pub enum ResultsError {
    #[error("Result file '{path}' does not exist")]
    Missing { path: PathBuf },

    #[error("Failed to read result file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse result file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Result file '{path}' is not a JSON object")]
    NotAnObject { path: PathBuf },
}

pub type Result<T> = std::result::Result<T, EngineError>;
