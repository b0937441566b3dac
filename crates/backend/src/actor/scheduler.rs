use std::{path::PathBuf, sync::Arc, time::Duration};

use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{handle::StateHandle, pipeline::PipelineStats, pool::WorkerPool};
use crate::{
  domain::config::Config,
  state::{epoch_now, write_atomic},
};

/// Janitor configuration.
///
/// Zero `retention` disables pruning; zero health or stats intervals disable
/// those timers.
#[derive(Debug, Clone)]
pub struct JanitorConfig {
  pub retention: Duration,
  pub interval: Duration,
  pub health_file: Option<PathBuf>,
  pub health_interval: Duration,
  pub stats_interval: Duration,
}

impl JanitorConfig {
  pub fn from_config(config: &Config) -> Self {
    Self {
      retention: config.retention(),
      interval: config.janitor_interval(),
      health_file: config.daemon.health_file.clone(),
      health_interval: Duration::from_secs(config.daemon.health_interval_secs),
      stats_interval: Duration::from_secs(config.daemon.stats_interval_secs),
    }
  }
}

/// Background housekeeping for the daemon.
///
/// Handles:
/// - Hash cache pruning (entries not seen within the retention window)
/// - Health heartbeat file for container liveness probes
/// - Periodic statistics logging
pub struct StateJanitor {
  state: StateHandle,
  stats: Arc<PipelineStats>,
  pool: Option<WorkerPool>,
  config: JanitorConfig,
}

impl StateJanitor {
  pub fn new(state: StateHandle, stats: Arc<PipelineStats>, config: JanitorConfig) -> Self {
    Self {
      state,
      stats,
      pool: None,
      config,
    }
  }

  /// Include the pool's in-flight count in stats lines.
  pub fn with_pool(mut self, pool: WorkerPool) -> Self {
    self.pool = Some(pool);
    self
  }

  /// Run until cancelled. Pruning happens once at startup, then every interval.
  pub async fn run(self, cancel: CancellationToken) {
    let mut prune_timer = interval(self.config.interval);
    let mut health_timer = interval(non_zero(self.config.health_interval));
    let mut stats_timer = interval(non_zero(self.config.stats_interval));
    for timer in [&mut prune_timer, &mut health_timer, &mut stats_timer] {
      timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    }

    // The first prune tick fires immediately and doubles as the startup prune.
    // Skip the immediate stats tick; nothing has happened yet.
    stats_timer.tick().await;

    info!(
      retention_days = self.config.retention.as_secs() / 86_400,
      interval = ?self.config.interval,
      "State janitor started"
    );

    loop {
      tokio::select! {
          biased;

          _ = cancel.cancelled() => {
              debug!("State janitor shutting down (cancelled)");
              break;
          }

          _ = prune_timer.tick() => {
              self.prune().await;
          }

          _ = health_timer.tick(), if self.heartbeat_enabled() => {
              self.heartbeat();
          }

          _ = stats_timer.tick(), if !self.config.stats_interval.is_zero() => {
              self.log_stats().await;
          }
      }
    }

    info!("State janitor stopped");
  }

  /// Prune stale hash cache entries. Returns how many were removed.
  pub async fn prune(&self) -> usize {
    if self.config.retention.is_zero() {
      return 0;
    }

    match self.state.prune(self.config.retention).await {
      Ok(0) => {
        debug!("Hash cache prune: nothing stale");
        0
      }
      Ok(removed) => {
        info!(removed, "Pruned stale hash cache entries");
        removed
      }
      Err(e) => {
        warn!(error = %e, "Hash cache prune failed");
        0
      }
    }
  }

  fn heartbeat_enabled(&self) -> bool {
    self.config.health_file.is_some() && !self.config.health_interval.is_zero()
  }

  fn heartbeat(&self) {
    let Some(path) = &self.config.health_file else {
      return;
    };
    let stamp = format!("{}\n", epoch_now() as u64);
    if let Err(e) = write_atomic(path, stamp.as_bytes()) {
      warn!(path = %path.display(), error = %e, "Failed to write health file");
    }
  }

  async fn log_stats(&self) {
    let pipeline = self.stats.snapshot();
    let in_flight = self.pool.as_ref().map(WorkerPool::in_flight).unwrap_or(0);

    match self.state.stats().await {
      Ok(state) => debug!(
        copied = pipeline.copied,
        duplicates = pipeline.duplicates,
        skipped = pipeline.skipped,
        timed_out = pipeline.timed_out,
        vanished = pipeline.vanished,
        failed = pipeline.failed,
        bytes_copied = pipeline.bytes_copied,
        in_flight,
        snapshot_entries = state.snapshot_entries,
        cache_entries = state.cache_entries,
        "Stats"
      ),
      Err(e) => debug!(error = %e, "State actor unavailable for stats"),
    }
  }
}

// `interval` panics on a zero period; disabled timers are guarded in select!
fn non_zero(period: Duration) -> Duration {
  if period.is_zero() { Duration::from_secs(3600) } else { period }
}
