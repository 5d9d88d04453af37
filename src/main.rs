//! restore-tool: restore a directory from its backup without a data-loss window

use anyhow::Result;
use clap::Parser;
use owo_colors::OwoColorize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "restore-tool")]
#[command(about = "Restore a live directory from its backup", long_about = None)]
#[command(version)]
struct Cli {
    /// Live resource to replace
    #[arg(long, value_name = "PATH", required_unless_present = "profile", requires = "backup")]
    live: Option<PathBuf>,

    /// Backup to restore from (directory or .tar.gz archive)
    #[arg(long, value_name = "PATH", required_unless_present = "profile", requires = "live")]
    backup: Option<PathBuf>,

    /// Refuse to restore while a process with this name is running
    #[arg(long, value_name = "PROCESS_NAME")]
    block_if_running: Option<String>,

    /// Use a named live/backup pair from the profiles file
    #[arg(long, short, conflicts_with_all = ["live", "backup"])]
    profile: Option<String>,

    /// Profiles file (defaults to <config dir>/restore-tool/profiles.json)
    #[arg(long, value_name = "FILE", requires = "profile")]
    config: Option<PathBuf>,

    /// Keep the replaced live resource next to the restored one
    #[arg(long)]
    keep_previous: bool,

    /// Check preconditions and show what would be done without making changes
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Print the outcome as JSON
    #[arg(long)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_logging(cli.verbose) {
        eprintln!("{} {:#}", "Warning:".yellow(), e);
    }

    if cli.dry_run && !cli.json {
        println!("{}", "(DRY-RUN MODE - no changes will be made)".blue());
    }

    let options = commands::restore::RestoreOptions {
        live: cli.live,
        backup: cli.backup,
        block_if_running: cli.block_if_running,
        profile: cli.profile,
        config: cli.config,
        keep_previous: cli.keep_previous,
        dry_run: cli.dry_run,
        json: cli.json,
    };

    ExitCode::from(commands::restore::execute(&options))
}

fn setup_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("safe_restore=debug,warn")
    } else {
        EnvFilter::new("safe_restore=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e))?;

    Ok(())
}
