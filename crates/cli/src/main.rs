//! dropcopy - copy new files from watched directories exactly once

use std::{path::PathBuf, process::ExitCode};

use clap::{Parser, Subcommand};

mod commands;
mod logging;

use commands::{cmd_config_show, cmd_state_prune, cmd_state_show, cmd_watch};
use logging::init_cli_logging;

#[derive(Parser)]
#[command(name = "dropcopy")]
#[command(about = "Watch directories and copy new files to a destination exactly once")]
#[command(after_help = "\
QUICK START:
  SOURCE=/scans DEST=/consume dropcopy      # Watch with environment config
  dropcopy --config dropcopy.toml watch     # Watch with a config file
  dropcopy config                           # Print the effective configuration
  dropcopy state show                       # Inspect persisted state")]
struct Cli {
  /// Config file (default: user config, then environment only)
  #[arg(short, long, global = true, value_name = "FILE")]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Watch the sources and copy new files (default)
  Watch {
    /// Log what would be copied without copying
    #[arg(long)]
    dry_run: bool,
  },
  /// Print the effective configuration as TOML
  Config,
  /// Inspect or maintain persisted state
  State {
    #[command(subcommand)]
    command: StateCommand,
  },
}

/// Subcommands for `dropcopy state`
#[derive(Subcommand)]
pub enum StateCommand {
  /// Show snapshot and hash cache summaries
  Show {
    /// Output as JSON
    #[arg(long)]
    json: bool,
  },
  /// Drop hash cache entries not seen within the retention window
  Prune {
    /// Retention in days (default: configured value)
    #[arg(long)]
    retention_days: Option<u64>,
  },
}

#[tokio::main]
async fn main() -> ExitCode {
  let cli = Cli::parse();
  let config = cli.config.as_deref();

  let result = match cli.command.unwrap_or(Commands::Watch { dry_run: false }) {
    // Watch installs its own, config-driven logging and picks its exit code
    Commands::Watch { dry_run } => return cmd_watch(config, dry_run).await,
    Commands::Config => {
      init_cli_logging();
      cmd_config_show(config)
    }
    Commands::State { command } => {
      init_cli_logging();
      match command {
        StateCommand::Show { json } => cmd_state_show(config, json),
        StateCommand::Prune { retention_days } => cmd_state_prune(config, retention_days),
      }
    }
  };

  match result {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      eprintln!("Error: {:#}", e);
      ExitCode::FAILURE
    }
  }
}
