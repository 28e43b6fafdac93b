//! # Agentic Search CLI (`agentic-search`)
//!
//! Keeps a remote document index in step with a local folder.
//!
//! ## Usage
//!
//! ```bash
//! agentic-search [--config ./agentic-search.toml] <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `agentic-search init <folder>` | Upload a folder into a new index |
//! | `agentic-search sync <folder>` | Upload new files and remove deleted ones |
//! | `agentic-search list` | List indexed files |
//! | `agentic-search stats` | Show index status and usage |
//! | `agentic-search cleanup` | Delete the index and forget it |
//!
//! ## Examples
//!
//! ```bash
//! # Index a docs folder, waiting at most five minutes for indexing
//! agentic-search init ./docs --index-timeout 300
//!
//! # Preview what a sync would change
//! agentic-search sync ./docs --dry-run
//!
//! # Apply it without prompting
//! agentic-search sync ./docs -y
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use agentic_search::cleanup::run_cleanup;
use agentic_search::config::load_config;
use agentic_search::ingest::{run_init, run_sync, RunOptions, Session};
use agentic_search::logging::init_logging;
use agentic_search::progress::ProgressMode;
use agentic_search::remote::openai::OpenAiIndex;
use agentic_search::stats::{run_list, run_stats};

const DEFAULT_CONFIG_PATH: &str = "./agentic-search.toml";

/// Agentic Search: keep a remote document index in step with a local folder.
///
/// Files are selected with `.gitignore` and `.agentic_search_ignore`
/// patterns. Only added and deleted files are sent to the remote.
#[derive(Parser)]
#[command(name = "agentic-search", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./agentic-search.toml`; built-in defaults apply when
    /// that file does not exist.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Path to the state file, overriding `[state].path`.
    #[arg(long, global = true)]
    state: Option<PathBuf>,

    /// Progress output on stderr. Defaults to `human` on a terminal, `off` otherwise.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressMode>,

    /// Enable debug logging (overridden by `RUST_LOG`).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload every file of a folder into a new index.
    ///
    /// Replaces any index recorded in the state file after confirmation.
    Init {
        /// Folder to index.
        folder: PathBuf,

        /// Seconds to wait for indexing to finish; `0` waits indefinitely.
        #[arg(long)]
        index_timeout: Option<u64>,

        /// Do not ask for confirmation.
        #[arg(short = 'y', long = "yes")]
        yes: bool,
    },

    /// Bring the index in line with the folder.
    ///
    /// Uploads files that are new locally and removes files that no longer
    /// exist. Files are compared by relative path only.
    Sync {
        /// Folder to sync.
        folder: PathBuf,

        /// Seconds to wait for indexing to finish; `0` waits indefinitely.
        #[arg(long)]
        index_timeout: Option<u64>,

        /// Do not ask for confirmation.
        #[arg(short = 'y', long = "yes")]
        yes: bool,

        /// Show what would change without touching the index.
        #[arg(long)]
        dry_run: bool,
    },

    /// List indexed files.
    List,

    /// Show index status, usage and file counts.
    Stats,

    /// Delete the remote index and its files, then remove the state file.
    Cleanup {
        /// Do not ask for confirmation.
        #[arg(short = 'y', long = "yes")]
        yes: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut cfg = match &cli.config {
        Some(path) => load_config(path, true)?,
        None => load_config(&PathBuf::from(DEFAULT_CONFIG_PATH), false)?,
    };
    if let Some(state) = &cli.state {
        cfg.state.path = state.clone();
    }
    let state_path = cfg.state.path.clone();
    let reporter = cli
        .progress
        .unwrap_or_else(ProgressMode::default_for_tty)
        .reporter();
    let session = Session {
        config: &cfg,
        state_path: &state_path,
        progress: reporter.as_ref(),
    };
    let connect = || OpenAiIndex::new(&cfg.remote);

    match cli.command {
        Commands::Init {
            folder,
            index_timeout,
            yes,
        } => {
            let opts = RunOptions {
                index_timeout,
                assume_yes: yes,
                dry_run: false,
            };
            run_init(&session, &folder, &opts, connect)?;
        }
        Commands::Sync {
            folder,
            index_timeout,
            yes,
            dry_run,
        } => {
            let opts = RunOptions {
                index_timeout,
                assume_yes: yes,
                dry_run,
            };
            run_sync(&session, &folder, &opts, connect)?;
        }
        Commands::List => {
            run_list(&state_path)?;
        }
        Commands::Stats => {
            run_stats(&state_path, connect)?;
        }
        Commands::Cleanup { yes } => {
            run_cleanup(&state_path, yes, connect)?;
        }
    }

    Ok(())
}
