//! Watch command

use std::{path::Path, process::ExitCode};

use dropcopy::{Daemon, config::Config, shutdown_signal};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::logging::init_daemon_logging;

/// Exit code for configuration errors
const EXIT_CONFIG: u8 = 2;

/// Run the watch daemon until SIGINT/SIGTERM.
pub async fn cmd_watch(config_path: Option<&Path>, dry_run: bool) -> ExitCode {
  // Logging depends on the config, so load errors go straight to stderr
  let mut config = match Config::load(config_path) {
    Ok(config) => config,
    Err(e) => {
      eprintln!("Error: {}", e);
      return ExitCode::from(EXIT_CONFIG);
    }
  };
  config.copy.dry_run |= dry_run;

  let _guard = init_daemon_logging(&config.daemon);

  let cancel = CancellationToken::new();
  let cancel_for_signal = cancel.clone();
  tokio::spawn(async move {
    shutdown_signal().await;
    info!("Shutdown requested");
    cancel_for_signal.cancel();
  });

  match Daemon::new(config).run(cancel).await {
    Ok(_) => ExitCode::SUCCESS,
    Err(e) => {
      error!("{}", e);
      ExitCode::from(e.exit_code())
    }
  }
}
