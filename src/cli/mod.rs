use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{ConfigLoader, CONFIG_ENV, DATA_ENV};
use crate::session::SessionStore;

pub mod commands;
pub mod editor;

use self::commands::{
    AccountArgs, AppContext, DeleteArgs, EditArgs, ListArgs, NoteArgs, SignInArgs, SignUpArgs,
};

#[derive(Parser, Debug)]
#[command(
    name = "purplenotes",
    version,
    about = "Purple Notes from the terminal"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Override the config file location (takes precedence over PURPLENOTES_CONFIG)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override the state directory holding the session (takes precedence over PURPLENOTES_DATA)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Minimum log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sign in and remember the session
    SignIn(SignInArgs),
    /// Create an account and sign in
    SignUp(SignUpArgs),
    /// Forget the stored session
    SignOut,
    /// Show the signed-in profile
    Whoami,
    /// List your notes (default)
    List(ListArgs),
    /// Print a note
    Show(NoteArgs),
    /// Create a new note
    New,
    /// Edit a note interactively with autosave
    Edit(EditArgs),
    /// Delete a note (asks for your password)
    Delete(DeleteArgs),
    /// Manage account settings
    Account(AccountArgs),
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
    init_tracing(&cli.log_level)
        .with_context(|| format!("initialising logging at level {}", cli.log_level))?;
    let config = loader.load_or_init()?;
    let sessions = SessionStore::new(loader.paths().session_file.clone());
    let ctx = AppContext::new(Arc::new(config), sessions);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting async runtime")?;
    let command = cli
        .command
        .unwrap_or_else(|| Commands::List(ListArgs::default()));
    runtime.block_on(commands::dispatch(&ctx, command))
}

fn init_tracing(level: &str) -> Result<()> {
    static INIT: OnceCell<()> = OnceCell::new();
    INIT.get_or_try_init(|| {
        let env_filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"));
        fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
        Ok(())
    })
    .map(|_| ())
}
