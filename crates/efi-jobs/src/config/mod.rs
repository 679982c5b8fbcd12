pub mod loader;
pub mod schema;

pub use loader::{default_settings_path, load_settings, load_settings_from_str};
pub use schema::{
    ApiSettings, HpcSettings, IncompleteResults, LogFormat, NextflowSettings, Settings, SlurmSettings,
};
