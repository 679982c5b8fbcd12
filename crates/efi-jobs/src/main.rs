use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use efi_jobs::config::{default_settings_path, load_settings};
use efi_jobs::logging::init_logging;
use efi_jobs::{ConnectorRegistry, EngineError, JobManager, JobStore, Settings, Status};

/// Drives EFI pipeline jobs through their lifecycle, one pass per run
#[derive(Parser)]
#[command(about, version)]
struct Cli {
    /// Path to the settings file (default: ~/.efi-jobs/settings.json)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Log what would happen without touching the store or the backend
    #[arg(long)]
    dry_run: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Advance running jobs and start new ones (default)
    Run,
    /// Create or migrate the job database
    InitDb,
    /// Print jobs matching a status
    List {
        /// Status name or union (incomplete, completed, current, all)
        #[arg(long, default_value = "incomplete")]
        status: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match settings_for(&cli) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("efi-jobs: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging(
        &settings.log_level,
        settings.log_file.as_deref(),
        settings.log_format,
    ) {
        eprintln!("efi-jobs: {}", e);
        return ExitCode::FAILURE;
    }

    match dispatch(cli.command.unwrap_or(Command::Run), &settings) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "efi-jobs failed");
            ExitCode::FAILURE
        }
    }
}

fn settings_for(cli: &Cli) -> Result<Settings, EngineError> {
    let path = match &cli.config {
        Some(path) => path.clone(),
        None => default_settings_path()?,
    };
    let mut settings = load_settings(&path)?;
    settings.dry_run |= cli.dry_run;
    Ok(settings)
}

fn dispatch(command: Command, settings: &Settings) -> Result<(), EngineError> {
    match command {
        Command::Run => {
            let manager = JobManager::from_settings(settings, &ConnectorRegistry::with_builtins())?;
            if settings.dry_run {
                info!("Dry run: no store writes or backend calls");
            }
            manager.run_once()?;
            manager.finish()?;
        }
        Command::InitDb => {
            let store = JobStore::open(&settings.database_path, settings.dry_run)?;
            info!(path = %settings.database_path.display(), "Job database ready");
            store.close()?;
        }
        Command::List { status } => {
            let mask = Status::parse_filter(&status)?;
            let store = JobStore::open(&settings.database_path, true)?;
            for job in store.fetch(mask)? {
                println!("{}", job);
            }
            store.close()?;
        }
    }
    Ok(())
}
