//! `boxtrack` command-line entry point.
//!
//! # Responsibility
//! - Parse arguments, start logging, open the store and dispatch commands.
//! - Print command results as JSON on stdout; diagnostics go to the log.

use anyhow::{anyhow, Result};
use boxtrack_core::{default_log_level, init_logging, LogTarget};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

mod commands;

#[derive(Parser)]
#[command(name = "boxtrack")]
#[command(about = "Box hierarchy and item custody store", long_about = None)]
#[command(version)]
struct Cli {
    /// SQLite database file (created and migrated on first use)
    #[arg(long, global = true, default_value = "boxtrack.db")]
    db: PathBuf,
    /// Absolute directory for rolling log files; logs go to stderr when omitted
    #[arg(long, global = true)]
    log_dir: Option<String>,
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,
    /// Seeding config JSON (`reserved` range, `full_start` id)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild the reserved id band from a JSON seed forest
    Seed {
        /// JSON file holding a list of seed nodes
        fixture: PathBuf,
    },
    /// Wipe everything and seed from a JSON forest outside the reserved band
    SeedFull {
        /// JSON file holding a list of seed nodes
        fixture: PathBuf,
        /// Required: confirms every box and item will be deleted
        #[arg(long)]
        yes_wipe_everything: bool,
    },
    /// Delete every box in the reserved band and the items it holds
    WipeReserved,
    /// Print the subtree rooted at a box
    Tree {
        /// 3-digit short id of the root box
        short_id: String,
        /// Include breadcrumbs above the root
        #[arg(long)]
        ancestors: bool,
        /// Include box/item aggregates
        #[arg(long)]
        stats: bool,
        /// Include a flattened item list with paths
        #[arg(long)]
        flatten: bool,
    },
    /// List items held by no box
    Orphans,
    /// Check stored invariants; exits non-zero when any finding is reported
    Audit,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            log::error!("event=cli_exit module=cli status=error");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let level = cli.log_level.as_deref().unwrap_or(default_log_level());
    let target = match cli.log_dir.as_deref() {
        Some(dir) => LogTarget::directory(dir).map_err(|err| anyhow!(err))?,
        None => LogTarget::Stderr,
    };
    init_logging(level, target).map_err(|err| anyhow!(err))?;

    let conn = boxtrack_core::open_db(&cli.db)?;
    let config = commands::load_seed_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Seed { fixture } => commands::seed(&conn, config, &fixture),
        Commands::SeedFull {
            fixture,
            yes_wipe_everything,
        } => commands::seed_full(&conn, config, &fixture, yes_wipe_everything),
        Commands::WipeReserved => commands::wipe_reserved(&conn, config),
        Commands::Tree {
            short_id,
            ancestors,
            stats,
            flatten,
        } => commands::tree(&conn, &short_id, ancestors, stats, flatten),
        Commands::Orphans => commands::orphans(&conn),
        Commands::Audit => commands::audit(&conn),
    }
}
