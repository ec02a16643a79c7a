mod commands;
mod config;
mod display;
mod error;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use colored::Colorize;
use nimbus_core::resource::ResourceId;
use nimbus_provider_upcloud::resources::resource_types;
use nimbus_state::{StateBackend, create_backend};

use crate::config::{Configuration, schemas};
use crate::error::CliError;

#[derive(Parser)]
#[command(name = "nimbus")]
#[command(about = "Declarative management of UpCloud resources", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration file
    Validate {
        /// Path to the configuration file
        #[arg(default_value = "main.json")]
        file: PathBuf,
    },
    /// Show execution plan without applying changes
    Plan {
        /// Path to the configuration file
        #[arg(default_value = "main.json")]
        file: PathBuf,
    },
    /// Apply changes to reach the desired state
    Apply {
        /// Path to the configuration file
        #[arg(default_value = "main.json")]
        file: PathBuf,
    },
    /// Destroy every resource recorded in state
    Destroy {
        /// Path to the configuration file
        #[arg(default_value = "main.json")]
        file: PathBuf,

        /// Skip confirmation prompt (auto-approve)
        #[arg(long)]
        auto_approve: bool,
    },
    /// Adopt an existing remote object into state
    Import {
        /// Resource type (e.g. managed_database_user)
        resource_type: String,
        /// Resource name used in the configuration file
        name: String,
        /// Remote identifier (e.g. <serviceUUID>/<username>)
        id: String,

        /// Path to the configuration file
        #[arg(default_value = "main.json")]
        file: PathBuf,
    },
    /// State management commands
    State {
        #[command(subcommand)]
        command: StateCommands,
    },
}

#[derive(Subcommand)]
enum StateCommands {
    /// List resources recorded in state
    List {
        /// Path to the configuration file
        #[arg(default_value = "main.json")]
        file: PathBuf,
    },
    /// Remove a lock left behind by an interrupted run
    Unlock {
        /// Lock ID shown in the "State is locked" error
        lock_id: String,

        /// Path to the configuration file
        #[arg(default_value = "main.json")]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Validate { file } => run_validate(&file),
        Commands::Plan { file } => run_plan(&file).await,
        Commands::Apply { file } => run_apply(&file).await,
        Commands::Destroy { file, auto_approve } => run_destroy(&file, auto_approve).await,
        Commands::Import {
            resource_type,
            name,
            id,
            file,
        } => run_import(&file, ResourceId::new(resource_type, name), &id).await,
        Commands::State { command } => run_state_command(command).await,
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn run_validate(file: &PathBuf) -> Result<(), CliError> {
    let config = Configuration::load(file)?;
    commands::validate(&config.resources, &schemas(resource_types()))
}

async fn run_plan(file: &PathBuf) -> Result<(), CliError> {
    let config = Configuration::load(file)?;
    let provider = config.provider()?;
    let backend = open_backend(&config).await?;
    commands::plan(&config.resources, provider.as_ref(), backend.as_ref()).await?;
    Ok(())
}

async fn run_apply(file: &PathBuf) -> Result<(), CliError> {
    let config = Configuration::load(file)?;
    let provider = config.provider()?;
    let backend = open_backend(&config).await?;
    commands::apply(&config.resources, provider.as_ref(), backend.as_ref()).await?;
    Ok(())
}

async fn run_destroy(file: &PathBuf, auto_approve: bool) -> Result<(), CliError> {
    let config = Configuration::load(file)?;
    let provider = config.provider()?;
    let backend = open_backend(&config).await?;
    commands::destroy(provider.as_ref(), backend.as_ref(), auto_approve).await?;
    Ok(())
}

async fn run_import(file: &PathBuf, id: ResourceId, import_id: &str) -> Result<(), CliError> {
    let config = Configuration::load(file)?;
    let provider = config.provider()?;
    let backend = open_backend(&config).await?;
    commands::import(provider.as_ref(), backend.as_ref(), &id, import_id).await
}

async fn run_state_command(command: StateCommands) -> Result<(), CliError> {
    match command {
        StateCommands::List { file } => {
            let config = Configuration::load(&file)?;
            let backend = open_backend(&config).await?;
            commands::state_list(backend.as_ref()).await
        }
        StateCommands::Unlock { lock_id, file } => {
            let config = Configuration::load(&file)?;
            let backend = open_backend(&config).await?;
            commands::force_unlock(backend.as_ref(), &lock_id).await
        }
    }
}

async fn open_backend(config: &Configuration) -> Result<Box<dyn StateBackend>, CliError> {
    Ok(create_backend(&config.backend).await?)
}
