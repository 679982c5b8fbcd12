use std::path::{Path, PathBuf};

use crate::config::schema::Settings;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/settings-v1.json");

pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<Settings, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_settings_from_str(&content)
}

pub fn load_settings_from_str(content: &str) -> Result<Settings, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let settings: Settings = serde_json::from_value(json_value)?;

    validate_settings(&settings)?;

    Ok(settings)
}

/// `~/.efi-jobs/settings.json`
pub fn default_settings_path() -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .map(|h| h.join(".efi-jobs").join("settings.json"))
        .ok_or(ConfigError::NoHomeDirectory)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn validate_settings(settings: &Settings) -> Result<(), ConfigError> {
    if settings.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported settings version: {}", settings.version),
        });
    }

    if settings.max_running_jobs == 0 {
        return Err(ConfigError::Validation {
            message: "max_running_jobs must be at least 1".to_string(),
        });
    }

    if settings.execution_connector.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "execution_connector must not be empty".to_string(),
        });
    }

    if settings.local_job_directory == settings.local_input_directory {
        return Err(ConfigError::Validation {
            message: "local_job_directory and local_input_directory must differ".to_string(),
        });
    }

    // Fixed parameters must not shadow the keys the engine owns.
    for reserved in ["final_output_dir", "import_mode", "filter", "job_id"] {
        if settings.nextflow.params.contains_key(reserved) {
            return Err(ConfigError::Validation {
                message: format!("nextflow.params may not set '{}'", reserved),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IncompleteResults;

    const MINIMAL: &str = r#"
    {
        "version": "1.0",
        "local_job_directory": "/data/jobs",
        "local_input_directory": "/data/inputs"
    }
    "#;

    #[test]
    fn test_load_minimal_settings_applies_defaults() {
        let settings = load_settings_from_str(MINIMAL).unwrap();
        assert_eq!(settings.execution_connector, "local");
        assert_eq!(settings.max_running_jobs, 10);
        assert!(!settings.dry_run);
        assert_eq!(settings.log_level, "info");
        assert_eq!(settings.incomplete_results, IncompleteResults::KeepFinished);
        assert_eq!(settings.nextflow.executable, "nextflow");
        assert_eq!(settings.slurm.partition, "efi");
        assert!(settings.hpc.is_none());
        assert!(settings.api.is_none());
    }

    #[test]
    fn test_load_full_settings() {
        let json = r#"
        {
            "version": "1.0",
            "database_path": "/var/lib/efi/jobs.db",
            "execution_connector": "hpc",
            "local_job_directory": "/data/jobs",
            "local_input_directory": "/data/inputs",
            "max_running_jobs": 3,
            "dry_run": true,
            "log_file": "/var/log/efi-jobs.log",
            "log_level": "debug",
            "incomplete_results": "mark_failed",
            "nextflow": {
                "executable": "/opt/nextflow",
                "pipeline_dir": "/opt/pipelines",
                "config_dir": "/opt/conf",
                "params": { "efi_db": "/db/efi_202503.sqlite", "blast_num_cpus": 16 }
            },
            "slurm": { "partition": "long", "memory": "64GB", "cpus_per_task": 4, "ntasks": 1 },
            "hpc": {
                "hostname": "cluster.example.org",
                "username": "efi",
                "ssh_key_path": "/home/efi/.ssh/id_ed25519",
                "remote_job_directory": "/scratch/efi/jobs"
            }
        }
        "#;

        let settings = load_settings_from_str(json).unwrap();
        assert_eq!(settings.max_running_jobs, 3);
        assert!(settings.dry_run);
        assert_eq!(settings.incomplete_results, IncompleteResults::MarkFailed);
        assert_eq!(settings.nextflow.params.len(), 2);
        assert_eq!(settings.slurm.memory, "64GB");
        let hpc = settings.hpc.as_ref().unwrap();
        assert_eq!(hpc.destination(), "efi@cluster.example.org");
        assert_eq!(
            settings.input_path("x.fa"),
            PathBuf::from("/data/inputs/x.fa")
        );
    }

    #[test]
    fn test_missing_required_field() {
        let json = r#"{ "version": "1.0", "local_job_directory": "/data/jobs" }"#;
        let result = load_settings_from_str(json);
        assert!(matches!(result, Err(ConfigError::SchemaValidation { .. })));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let json = r#"
        {
            "version": "1.0",
            "local_job_directory": "/data/jobs",
            "local_input_directory": "/data/inputs",
            "max_jobs": 4
        }
        "#;
        assert!(matches!(
            load_settings_from_str(json),
            Err(ConfigError::SchemaValidation { .. })
        ));
    }

    #[test]
    fn test_zero_running_jobs_rejected() {
        let json = r#"
        {
            "version": "1.0",
            "local_job_directory": "/data/jobs",
            "local_input_directory": "/data/inputs",
            "max_running_jobs": 0
        }
        "#;
        assert!(load_settings_from_str(json).is_err());
    }

    #[test]
    fn test_reserved_parameter_rejected() {
        let json = r#"
        {
            "version": "1.0",
            "local_job_directory": "/data/jobs",
            "local_input_directory": "/data/inputs",
            "nextflow": { "params": { "final_output_dir": "/tmp" } }
        }
        "#;
        match load_settings_from_str(json) {
            Err(ConfigError::Validation { message }) => {
                assert!(message.contains("final_output_dir"));
            }
            other => panic!("Expected Validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_same_directories_rejected() {
        let json = r#"
        {
            "version": "1.0",
            "local_job_directory": "/data",
            "local_input_directory": "/data"
        }
        "#;
        assert!(matches!(
            load_settings_from_str(json),
            Err(ConfigError::Validation { .. })
        ));
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            load_settings_from_str("{ not json"),
            Err(ConfigError::ParseJson(_))
        ));
    }

    #[test]
    fn test_load_from_missing_file() {
        let result = load_settings("/definitely/not/here/settings.json");
        assert!(matches!(result, Err(ConfigError::ReadFile { .. })));
    }

    #[test]
    fn test_default_settings_path() {
        let path = default_settings_path().unwrap();
        assert!(path.ends_with(".efi-jobs/settings.json"));
    }
}
