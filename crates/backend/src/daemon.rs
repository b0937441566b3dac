//! Daemon lifecycle management.
//!
//! # Architecture
//!
//! ```text
//! Daemon (Supervisor)
//!   ├── StateActor (snapshot + hash cache, single writer)
//!   ├── EventIngest (notify watcher → bounded FsEvent channel)
//!   ├── Debouncer (FsEvent → Candidate)
//!   ├── WorkerPool dispatcher (Candidate → Pipeline)
//!   └── StateJanitor (prune, health file, stats)
//! ```
//!
//! # Lifecycle
//!
//! 1. Validate configuration (fails fast, before anything is watched)
//! 2. Load persisted state and spawn the `StateActor`
//! 3. Start event ingest; events buffer until the debouncer runs
//! 4. Scan the sources and merge the startup snapshot (persisted)
//! 5. Spawn the dispatcher, debouncer and janitor
//! 6. Dispatch files modified while the daemon was down
//! 7. Run until cancelled
//! 8. Graceful shutdown: stop ingest, drain the pool and pending webhook
//!    deliveries within the grace period, flush state

use std::{sync::Arc, time::SystemTime};

use tokio::sync::mpsc;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, info, warn};

use crate::{
  actor::{
    CandidateRouter, CandidateRunner, DebounceConfig, Debouncer, EventIngest, JanitorConfig, Pipeline, PipelineSettings, PipelineStats,
    StateActor, StateJanitor, WatcherError, WorkerPool,
    handle::{DispatchHandle, StateHandle},
    pipeline::StatsSnapshot,
  },
  domain::{
    candidate::{CandidateKind, Trigger},
    config::{Config, ConfigError},
  },
  service::{copy::DestinationLayout, filter::FileFilter, snapshot::build_snapshot, webhook::WebhookNotifier},
  state::{MergeReport, StateError, StateStore},
};

/// Capacity of the state actor's request channel
const STATE_CHANNEL_CAPACITY: usize = 256;

// ============================================================================
// Errors
// ============================================================================

/// Errors that abort the daemon before or during startup
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
  #[error(transparent)]
  Configuration(#[from] ConfigError),

  #[error("Failed to start watcher: {0}")]
  Watcher(#[from] WatcherError),

  #[error("Failed to initialize state: {0}")]
  State(#[from] StateError),

  #[error("Failed to build webhook client: {0}")]
  Webhook(#[source] reqwest::Error),

  #[error("Startup task failed: {0}")]
  Join(String),
}

impl DaemonError {
  /// Process exit code for this failure
  pub fn exit_code(&self) -> u8 {
    match self {
      DaemonError::Configuration(_) => 2,
      _ => 1,
    }
  }
}

// ============================================================================
// Daemon
// ============================================================================

/// The dropcopy daemon - owns the whole watch-and-copy lifecycle.
///
/// # Usage
///
/// ```ignore
/// let cancel = CancellationToken::new();
/// let daemon = Daemon::new(Config::load(None)?);
/// daemon.run(cancel).await?;
/// ```
pub struct Daemon {
  config: Config,
}

impl Daemon {
  pub fn new(config: Config) -> Self {
    Self { config }
  }

  /// Run until `cancel` fires, then shut down gracefully.
  ///
  /// Returns the final pipeline statistics.
  pub async fn run(self, cancel: CancellationToken) -> Result<StatsSnapshot, DaemonError> {
    let mut config = self.config;
    config.validate()?;

    let filter = FileFilter::from_config(&config.filter)
      .map_err(|e| ConfigError::Invalid(vec![format!("Invalid file pattern: {}", e)]))?;
    let webhook = match &config.webhook.url {
      Some(url) => {
        let notifier = WebhookNotifier::new(url.clone(), std::time::Duration::from_secs(config.webhook.timeout_secs))
          .map_err(DaemonError::Webhook)?;
        info!(url = %notifier.url(), "Copy notifications enabled");
        Some(notifier)
      }
      None => None,
    };

    info!(
      sources = ?config.sources,
      dest = %config.dest.display(),
      state_dir = %config.state_dir.display(),
      recursive = config.watch.recursive,
      preserve_dirs = config.copy.preserve_dirs,
      max_workers = config.workers.max_workers,
      dry_run = config.copy.dry_run,
      "Starting dropcopy"
    );

    // State
    let state_dir = config.state_dir.clone();
    let store = tokio::task::spawn_blocking(move || StateStore::load(&state_dir))
      .await
      .map_err(|e| DaemonError::Join(e.to_string()))?;
    let (state, state_task) = StateActor::spawn(store, STATE_CHANNEL_CAPACITY);

    // Ingest starts before the scan so nothing written during it is missed
    let (event_tx, event_rx) = mpsc::channel(config.watch.event_buffer);
    let ingest = EventIngest::start(&config.sources, &config.watch, event_tx)?;

    // Startup snapshot
    let report = startup_snapshot(&config, &state).await?;

    // Workers
    let stats = Arc::new(PipelineStats::default());
    let layout = DestinationLayout::new(config.dest.clone(), config.copy.preserve_dirs, config.copy.compress);
    let pipeline = Arc::new(Pipeline::new(
      PipelineSettings::from_config(&config),
      filter,
      state.clone(),
      webhook,
      Arc::clone(&stats),
    ));
    let runner: Arc<dyn CandidateRunner> = pipeline.clone();
    let pool = WorkerPool::new(runner, config.workers.max_workers);

    let tasks = TaskTracker::new();
    let (candidate_tx, candidate_rx) = mpsc::channel(config.watch.event_buffer);
    let dispatch = DispatchHandle::new(candidate_tx);
    tasks.spawn(pool.clone().dispatch(candidate_rx, cancel.child_token()));

    let router = CandidateRouter::new(config.sources.clone(), layout);
    let debouncer = Debouncer::new(
      DebounceConfig {
        window: config.debounce(),
        recursive: config.watch.recursive,
        copy_empty_dirs: config.copy.copy_empty_dirs,
      },
      router.clone(),
      state.clone(),
      dispatch.clone(),
      event_rx,
      cancel.child_token(),
    );
    tasks.spawn(debouncer.run());

    let janitor = StateJanitor::new(state.clone(), Arc::clone(&stats), JanitorConfig::from_config(&config))
      .with_pool(pool.clone());
    tasks.spawn(janitor.run(cancel.child_token()));

    dispatch_modified(&report, &router, &dispatch).await;
    drop(dispatch);

    info!("Watching for new files");
    cancel.cancelled().await;

    // Shutdown
    info!("Shutting down...");
    drop(ingest);
    tasks.close();
    tasks.wait().await;

    if !pool.shutdown(config.shutdown_grace()).await {
      warn!("Some copies were still running at shutdown; their files may be retried on the next event");
    }
    if !pipeline.drain_notifications(config.shutdown_grace()).await {
      warn!("Some copy notifications were not delivered before shutdown");
    }

    if let Err(e) = state.shutdown().await {
      warn!(error = %e, "Final state flush failed");
    }
    if let Err(e) = state_task.await {
      warn!(error = %e, "State actor ended abnormally");
    }

    let totals = stats.snapshot();
    info!(
      copied = totals.copied,
      duplicates = totals.duplicates,
      skipped = totals.skipped,
      timed_out = totals.timed_out,
      vanished = totals.vanished,
      failed = totals.failed,
      bytes_copied = totals.bytes_copied,
      "Daemon shutdown complete"
    );
    Ok(totals)
  }
}

/// Walk every source root and merge the result into the persisted snapshot.
async fn startup_snapshot(config: &Config, state: &StateHandle) -> Result<MergeReport, DaemonError> {
  let roots = config.sources.clone();
  let recursive = config.watch.recursive;
  let copy_empty_dirs = config.copy.copy_empty_dirs;

  let scanned = tokio::task::spawn_blocking(move || build_snapshot(&roots, recursive, copy_empty_dirs))
    .await
    .map_err(|e| DaemonError::Join(e.to_string()))?;

  let report = state.merge_scan(scanned).await?;
  info!(
    known = report.known,
    added = report.added,
    modified = report.modified.len(),
    removed = report.removed,
    "Startup snapshot saved"
  );
  Ok(report)
}

/// Files whose fingerprint changed while the daemon was down are candidates.
async fn dispatch_modified(report: &MergeReport, router: &CandidateRouter, dispatch: &DispatchHandle) {
  for path in &report.modified {
    let kind = match tokio::fs::metadata(path).await {
      Ok(metadata) if metadata.is_dir() => CandidateKind::EmptyDir,
      Ok(_) => CandidateKind::File,
      Err(e) => {
        debug!(path = %path.display(), error = %e, "Modified path gone before dispatch");
        continue;
      }
    };

    let Some(candidate) = router.route(path.clone(), kind, Trigger::Startup, SystemTime::now()) else {
      continue;
    };
    info!(path = %path.display(), trigger = %candidate.trigger, "Candidate discovered");
    if dispatch.dispatch(candidate).await.is_err() {
      warn!("Dispatcher gone before startup candidates were queued");
      return;
    }
  }
}

/// Resolves when the process receives SIGINT or SIGTERM.
pub async fn shutdown_signal() {
  let ctrl_c = async {
    if let Err(e) = tokio::signal::ctrl_c().await {
      warn!("Failed to listen for ctrl-c: {}", e);
      std::future::pending::<()>().await;
    }
  };

  #[cfg(unix)]
  let terminate = async {
    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
      Ok(mut sig) => {
        sig.recv().await;
      }
      Err(e) => {
        warn!("Failed to listen for SIGTERM: {}", e);
        std::future::pending::<()>().await;
      }
    }
  };

  #[cfg(not(unix))]
  let terminate = std::future::pending::<()>();

  tokio::select! {
      _ = ctrl_c => info!("Received SIGINT"),
      _ = terminate => info!("Received SIGTERM"),
  }
}
