//! Settings Sync command line front-end.
//!
//! Operates on the configured SQLite store. No collaborators are registered
//! here, so sync passes only exercise persistence and verification.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use settings_sync_lib::{
    init_tracing, load_config, ChangeOutcome, SettingsEngine, SettingsError, SettingsField,
};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "settings-sync")]
#[command(about = "Inspect and change synchronized settings")]
#[command(version)]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Settings database, overriding the config file
    #[arg(long, value_name = "PATH")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the current settings document
    Show,
    /// Replace the preselected task categories
    SetCategories {
        /// Category ids (order and duplicates are irrelevant)
        ids: Vec<String>,
    },
    /// Set automation toggles
    SetAutomation {
        /// Toggles as KEY=BOOL
        #[arg(value_parser = parse_toggle, required = true)]
        toggles: Vec<(String, bool)>,
    },
    /// Replace the settings with a JSON document
    Import {
        file: PathBuf,
    },
    /// Write the settings as JSON to a file or stdout
    Export {
        file: Option<PathBuf>,
    },
    /// Run a full synchronization pass
    Sync,
}

fn parse_toggle(raw: &str) -> Result<(String, bool), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=BOOL, got '{}'", raw))?;
    let value = value
        .trim()
        .parse::<bool>()
        .map_err(|_| format!("'{}' is not true or false", value))?;
    Ok((key.trim().to_string(), value))
}

fn report(outcome: ChangeOutcome) {
    match outcome {
        ChangeOutcome::Unchanged => println!("No change"),
        ChangeOutcome::Applied { persisted: true, .. } => println!("Saved"),
        ChangeOutcome::Applied {
            persisted: false, ..
        } => eprintln!("Applied for this session only; saving failed"),
    }
}

async fn run(cli: Cli) -> Result<(), SettingsError> {
    let mut config = load_config(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        config.db_path = Some(db);
    }

    let engine = SettingsEngine::open(config)?;

    match cli.command {
        Command::Show => println!("{}", engine.export_settings()?),
        Command::SetCategories { ids } => report(engine.set_preselected_categories(ids)),
        Command::SetAutomation { toggles } => {
            let mut settings = engine.snapshot().automation_settings;
            settings.extend(toggles);
            report(engine.set_automation_settings(settings));
        }
        Command::Import { file } => {
            let raw = std::fs::read_to_string(&file)?;
            let changed = engine.import_settings(&raw)?;
            if changed.is_empty() {
                println!("No change");
            } else {
                let names: Vec<&str> = changed.iter().map(SettingsField::as_str).collect();
                println!("Imported: {}", names.join(", "));
            }
        }
        Command::Export { file } => {
            let json = engine.export_settings()?;
            match file {
                Some(path) => {
                    std::fs::write(&path, json)?;
                    info!("Exported settings to {:?}", path);
                }
                None => println!("{}", json),
            }
        }
        Command::Sync => {
            engine.force_sync();
        }
    }

    engine.coordinator().wait_until_idle().await;
    Ok(())
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
