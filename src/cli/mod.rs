use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, EnvFilter};

use crate::app::App;
use crate::config::{ConfigLoader, CONFIG_ENV, DATA_ENV};
use crate::storage;

pub mod commands;

use self::commands::{AddArgs, DateArgs, DoneArgs, ListArgs, RemoveArgs, TagArgs};

#[derive(Parser, Debug)]
#[command(name = "taskrow", version, about = "Task list with an inline action bar")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Override the config file location (takes precedence over TASKROW_CONFIG)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override the data directory (takes precedence over TASKROW_DATA)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Minimum log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Launch the interactive task list (default)
    Tui,
    /// Capture a new task
    Add(AddArgs),
    /// Print tasks matching a query
    List(ListArgs),
    /// Set or clear one of a task's dates
    Date(DateArgs),
    /// Toggle a task's completion
    Done(DoneArgs),
    /// Replace a task's tags or list every tag in use
    Tag(TagArgs),
    /// Delete a task
    Rm(RemoveArgs),
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.config {
        env::set_var(CONFIG_ENV, path);
    }
    if let Some(path) = &cli.data_dir {
        env::set_var(DATA_ENV, path);
    }

    let loader = ConfigLoader::discover()?;
    loader.paths().ensure_directories()?;
    let paths = loader.paths().clone();
    init_tracing(&cli.log_level)
        .with_context(|| format!("initialising logging at level {}", cli.log_level))?;
    let config = loader.load_or_init()?;
    let storage = storage::init(&paths, &config.storage)?;

    let config = Arc::new(config);
    let command = cli.command.unwrap_or(Commands::Tui);
    match command {
        Commands::Tui => {
            let mut app = App::new(config.clone(), storage.clone())?;
            commands::run_tui(&mut app)
        }
        Commands::Add(args) => commands::add_task(&storage, args),
        Commands::List(args) => commands::list_tasks(&config, &storage, args),
        Commands::Date(args) => commands::set_date(&storage, args),
        Commands::Done(args) => commands::toggle_done(&storage, args),
        Commands::Tag(args) => commands::handle_tag_command(&storage, args),
        Commands::Rm(args) => commands::remove_task(&storage, args),
    }
}

fn init_tracing(level: &str) -> Result<()> {
    static INIT: OnceCell<()> = OnceCell::new();
    INIT.get_or_try_init(|| {
        let env_filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
        fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
        Ok(())
    })
    .map(|_| ())
}
