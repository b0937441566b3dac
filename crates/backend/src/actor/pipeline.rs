//! Candidate pipeline: stability → dedup → copy → state update
//!
//! ```text
//! Pending → StabilityChecking → {TimedOut, Vanished}
//!                             → Hashing → {Skipped(duplicate), Copying} → {Copied, Failed}
//! ```
//!
//! Every failure is terminal for its candidate only. Nothing is retried: a
//! later filesystem event produces a fresh candidate.

use std::{
  path::Path,
  sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
  },
  time::Duration,
};

use async_trait::async_trait;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use super::{handle::StateHandle, pool::CandidateRunner};
use crate::{
  domain::{
    candidate::{Candidate, CandidateKind, CandidateState, Outcome, SkipReason},
    config::Config,
    fingerprint::FileFingerprint,
  },
  service::{
    PipelineError,
    copy::{atomic_copy, create_empty_dir},
    dedup,
    filter::FileFilter,
    stability::{Stability, wait_until_stable},
    webhook::{CopyNotice, WebhookNotifier},
  },
};

// ============================================================================
// Statistics
// ============================================================================

/// Running totals of pipeline outcomes
#[derive(Debug, Default)]
pub struct PipelineStats {
  copied: AtomicU64,
  directories: AtomicU64,
  duplicates: AtomicU64,
  skipped: AtomicU64,
  timed_out: AtomicU64,
  vanished: AtomicU64,
  failed: AtomicU64,
  bytes_copied: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
  pub copied: u64,
  pub directories: u64,
  pub duplicates: u64,
  pub skipped: u64,
  pub timed_out: u64,
  pub vanished: u64,
  pub failed: u64,
  pub bytes_copied: u64,
}

impl PipelineStats {
  pub fn record(&self, outcome: &Outcome) {
    let counter = match outcome {
      Outcome::Copied { bytes, .. } => {
        self.bytes_copied.fetch_add(*bytes, Ordering::Relaxed);
        &self.copied
      }
      Outcome::DirectoryCreated => &self.directories,
      Outcome::Skipped(SkipReason::Duplicate) => &self.duplicates,
      Outcome::Skipped(_) => &self.skipped,
      Outcome::TimedOut => &self.timed_out,
      Outcome::Vanished => &self.vanished,
      Outcome::Failed(_) => &self.failed,
    };
    counter.fetch_add(1, Ordering::Relaxed);
  }

  pub fn snapshot(&self) -> StatsSnapshot {
    StatsSnapshot {
      copied: self.copied.load(Ordering::Relaxed),
      directories: self.directories.load(Ordering::Relaxed),
      duplicates: self.duplicates.load(Ordering::Relaxed),
      skipped: self.skipped.load(Ordering::Relaxed),
      timed_out: self.timed_out.load(Ordering::Relaxed),
      vanished: self.vanished.load(Ordering::Relaxed),
      failed: self.failed.load(Ordering::Relaxed),
      bytes_copied: self.bytes_copied.load(Ordering::Relaxed),
    }
  }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Pipeline knobs derived from [`Config`]
#[derive(Debug, Clone)]
pub struct PipelineSettings {
  pub stability_interval: Duration,
  pub stable_rounds: u32,
  pub copy_timeout: Duration,
  pub compress: bool,
  pub dry_run: bool,
  pub delete_source: bool,
}

impl PipelineSettings {
  pub fn from_config(config: &Config) -> Self {
    Self {
      stability_interval: config.stability_interval(),
      stable_rounds: config.stability.stable_rounds,
      copy_timeout: config.copy_timeout(),
      compress: config.copy.compress,
      dry_run: config.copy.dry_run,
      delete_source: config.copy.delete_source,
    }
  }
}

pub struct Pipeline {
  settings: PipelineSettings,
  filter: FileFilter,
  state: StateHandle,
  webhook: Option<WebhookNotifier>,
  notifications: TaskTracker,
  stats: Arc<PipelineStats>,
}

impl Pipeline {
  pub fn new(
    settings: PipelineSettings,
    filter: FileFilter,
    state: StateHandle,
    webhook: Option<WebhookNotifier>,
    stats: Arc<PipelineStats>,
  ) -> Self {
    Self {
      settings,
      filter,
      state,
      webhook,
      notifications: TaskTracker::new(),
      stats,
    }
  }

  /// Wait up to `grace` for webhook deliveries still in flight.
  ///
  /// Returns `false` if some were still pending when the grace period ran out.
  pub async fn drain_notifications(&self, grace: Duration) -> bool {
    self.notifications.close();
    if self.notifications.is_empty() {
      return true;
    }
    debug!(pending = self.notifications.len(), "Waiting for webhook deliveries");
    tokio::time::timeout(grace, self.notifications.wait()).await.is_ok()
  }

  async fn process(&self, candidate: &Candidate) -> Result<Outcome, PipelineError> {
    if candidate.kind == CandidateKind::EmptyDir {
      return self.materialize_dir(candidate).await;
    }

    if let Some(reason) = self.filter.check_name(&candidate.source) {
      return Ok(Outcome::Skipped(reason));
    }

    trace_state(candidate, CandidateState::StabilityChecking);
    let stability = wait_until_stable(
      &candidate.source,
      self.settings.stability_interval,
      self.settings.stable_rounds,
      self.settings.copy_timeout,
    )
    .await
    .map_err(|e| PipelineError::io(&candidate.source, e))?;

    let size = match stability {
      Stability::Stable { size } => size,
      Stability::TimedOut => {
        return Err(PipelineError::StabilityTimeout {
          path: candidate.source.clone(),
          timeout: self.settings.copy_timeout,
        });
      }
      Stability::Vanished => {
        return Err(PipelineError::VanishedSource {
          path: candidate.source.clone(),
        });
      }
    };
    debug!(path = %candidate.source.display(), size, "Stable");

    if let Some(reason) = self.filter.check_size(size) {
      return Ok(Outcome::Skipped(reason));
    }

    let fingerprint = FileFingerprint::of_path(&candidate.source).map_err(|e| PipelineError::io(&candidate.source, e))?;

    trace_state(candidate, CandidateState::Hashing);
    let decision = dedup::should_copy(&candidate.source, &candidate.destination, &self.state).await?;

    if !decision.copy {
      if let Err(e) = self
        .state
        .record_duplicate(candidate.source.clone(), fingerprint, candidate.destination.clone())
        .await
      {
        warn!(path = %candidate.source.display(), error = %e, "Failed to record duplicate");
      }
      return Ok(Outcome::Skipped(SkipReason::Duplicate));
    }

    if self.settings.dry_run {
      info!(
        source = %candidate.source.display(),
        destination = %candidate.destination.display(),
        size,
        hash = %decision.hash,
        "Dry run: would copy"
      );
      return Ok(Outcome::Skipped(SkipReason::DryRun));
    }

    trace_state(candidate, CandidateState::Copying);
    let source = candidate.source.clone();
    let destination = candidate.destination.clone();
    let compress = self.settings.compress;
    let result = tokio::task::spawn_blocking(move || atomic_copy(&source, &destination, compress))
      .await
      .map_err(|e| PipelineError::io(&candidate.source, std::io::Error::other(e)))?
      .map_err(|e| PipelineError::io(&candidate.source, e))?;

    if let Err(e) = self
      .state
      .record_copy(
        candidate.source.clone(),
        fingerprint,
        candidate.destination.clone(),
        decision.hash.clone(),
      )
      .await
    {
      error!(path = %candidate.source.display(), error = %e, "Copied but failed to record state");
    }

    if self.settings.delete_source {
      self.delete_source(&candidate.source).await;
    }

    if let Some(webhook) = &self.webhook {
      let webhook = webhook.clone();
      let notice = CopyNotice {
        source: candidate.source.display().to_string(),
        destination: candidate.destination.display().to_string(),
        size_bytes: result.bytes,
        hash: decision.hash,
        elapsed_seconds: result.elapsed.as_secs_f64(),
        compressed: compress,
      };
      self
        .notifications
        .spawn(async move { webhook.file_copied(&notice).await });
    }

    Ok(Outcome::Copied {
      bytes: result.bytes,
      elapsed: result.elapsed,
    })
  }

  async fn materialize_dir(&self, candidate: &Candidate) -> Result<Outcome, PipelineError> {
    if self.settings.dry_run {
      info!(destination = %candidate.destination.display(), "Dry run: would create directory");
      return Ok(Outcome::Skipped(SkipReason::DryRun));
    }

    create_empty_dir(&candidate.destination).map_err(|e| PipelineError::io(&candidate.destination, e))?;

    if let Err(e) = self
      .state
      .record_known(candidate.source.clone(), FileFingerprint::ZERO)
      .await
    {
      warn!(path = %candidate.source.display(), error = %e, "Failed to record directory");
    }
    Ok(Outcome::DirectoryCreated)
  }

  async fn delete_source(&self, source: &Path) {
    match tokio::fs::remove_file(source).await {
      Ok(()) => {
        info!(path = %source.display(), "Deleted source after copy");
        if let Err(e) = self.state.forget(source.to_path_buf()).await {
          warn!(path = %source.display(), error = %e, "Failed to forget deleted source");
        }
      }
      Err(e) => warn!(path = %source.display(), error = %e, "Failed to delete source after copy"),
    }
  }
}

fn trace_state(candidate: &Candidate, state: CandidateState) {
  tracing::trace!(path = %candidate.source.display(), state = ?state, "Pipeline state");
}

fn report(candidate: &Candidate, outcome: &Outcome) {
  let source = candidate.source.display();
  let destination = candidate.destination.display();

  match outcome {
    Outcome::Copied { bytes, elapsed } => info!(
      source = %source,
      destination = %destination,
      bytes,
      elapsed_ms = elapsed.as_millis() as u64,
      "Copied"
    ),
    Outcome::DirectoryCreated => info!(source = %source, destination = %destination, "Created empty directory"),
    Outcome::Skipped(SkipReason::Duplicate) => {
      info!(source = %source, destination = %destination, "Skipped: identical to last copy")
    }
    Outcome::Skipped(SkipReason::Filtered) => debug!(source = %source, "Skipped: filtered by name"),
    Outcome::Skipped(SkipReason::TooLarge) => info!(source = %source, "Skipped: exceeds size limit"),
    Outcome::Skipped(SkipReason::DryRun) => {}
    Outcome::TimedOut => warn!(source = %source, "Timed out waiting for file to settle, not copied"),
    Outcome::Vanished => info!(source = %source, "Source vanished before copy"),
    Outcome::Failed(reason) => error!(source = %source, destination = %destination, reason = %reason, "Copy failed"),
  }
}

#[async_trait]
impl CandidateRunner for Pipeline {
  async fn run(&self, candidate: Candidate) -> Outcome {
    let outcome = match self.process(&candidate).await {
      Ok(outcome) => outcome,
      Err(e) => e.outcome(),
    };

    report(&candidate, &outcome);
    self.stats.record(&outcome);
    outcome
  }
}
