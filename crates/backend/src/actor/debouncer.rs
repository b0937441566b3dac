//! Debouncer - collapses event bursts into one candidate per path
//!
//! Each event (re)arms a per-path quiet window. When a path has been quiet for
//! the whole window it settles:
//! - removals drop the path from the snapshot
//! - directories are scanned once and every entry becomes its own candidate
//! - files are fingerprinted and checked against the snapshot, so untouched
//!   pre-existing files never produce a candidate
//!
//! Settled candidates go to the worker pool through a [`DispatchHandle`].

use std::{
  collections::HashMap,
  path::PathBuf,
  time::{Duration, Instant, SystemTime},
};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::{
  handle::{DispatchHandle, StateHandle},
  watcher::FsEvent,
};
use crate::{
  domain::{
    candidate::{Candidate, CandidateKind, EventKind, Trigger},
    fingerprint::FileFingerprint,
  },
  service::{
    copy::DestinationLayout,
    snapshot::{ScanEntry, is_empty_dir, scan_dir},
  },
};

/// Smallest settle-check period regardless of the debounce window
const MIN_TICK: Duration = Duration::from_millis(10);

/// Debounce and directory-scan settings
#[derive(Debug, Clone)]
pub struct DebounceConfig {
  pub window: Duration,
  pub recursive: bool,
  pub copy_empty_dirs: bool,
}

impl DebounceConfig {
  fn tick(&self) -> Duration {
    (self.window / 4).max(MIN_TICK)
  }
}

/// A pending change that is being debounced
#[derive(Debug)]
struct PendingChange {
  kind: EventKind,
  first_seen: SystemTime,
  last_event: Instant,
}

impl PendingChange {
  fn new(kind: EventKind) -> Self {
    Self {
      kind,
      first_seen: SystemTime::now(),
      last_event: Instant::now(),
    }
  }

  /// Re-arm the window, coalescing the kind
  fn update(&mut self, kind: EventKind) {
    self.last_event = Instant::now();

    match (self.kind, kind) {
      // Create followed by modify is still a create
      (EventKind::Created, EventKind::Modified) => {}
      // Delete followed by create is a modify
      (EventKind::Removed, EventKind::Created) => self.kind = EventKind::Modified,
      _ => self.kind = kind,
    }
  }
}

/// Resolves source paths into routed candidates.
#[derive(Debug, Clone)]
pub struct CandidateRouter {
  roots: Vec<PathBuf>,
  layout: DestinationLayout,
}

impl CandidateRouter {
  pub fn new(roots: Vec<PathBuf>, layout: DestinationLayout) -> Self {
    Self { roots, layout }
  }

  pub fn roots(&self) -> &[PathBuf] {
    &self.roots
  }

  /// Build a candidate for `source`, or `None` when it lies outside every
  /// root or its destination cannot be resolved.
  pub fn route(
    &self,
    source: PathBuf,
    kind: CandidateKind,
    trigger: Trigger,
    first_seen_at: SystemTime,
  ) -> Option<Candidate> {
    let root = super::watcher::owning_root(&self.roots, &source)?.clone();

    let destination = match kind {
      CandidateKind::File => self.layout.resolve(&source, &root),
      CandidateKind::EmptyDir => self.layout.resolve_dir(&source, &root),
    };

    match destination {
      Ok(destination) => Some(Candidate {
        source,
        root,
        destination,
        kind,
        trigger,
        first_seen_at,
      }),
      Err(e) => {
        error!(path = %source.display(), error = %e, "Cannot route candidate");
        None
      }
    }
  }
}

pub struct Debouncer {
  config: DebounceConfig,
  router: CandidateRouter,
  state: StateHandle,
  dispatch: DispatchHandle,
  events: mpsc::Receiver<FsEvent>,
  cancel: CancellationToken,
}

impl Debouncer {
  pub fn new(
    config: DebounceConfig,
    router: CandidateRouter,
    state: StateHandle,
    dispatch: DispatchHandle,
    events: mpsc::Receiver<FsEvent>,
    cancel: CancellationToken,
  ) -> Self {
    Self {
      config,
      router,
      state,
      dispatch,
      events,
      cancel,
    }
  }

  /// Run until cancelled or the event channel closes.
  ///
  /// Changes still pending at shutdown are dropped: they never settled.
  pub async fn run(mut self) {
    debug!(window = ?self.config.window, "Debouncer started");

    let mut pending: HashMap<PathBuf, PendingChange> = HashMap::new();
    let mut ticker = tokio::time::interval(self.config.tick());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
      tokio::select! {
          biased;

          _ = self.cancel.cancelled() => {
              debug!("Debouncer shutting down (cancelled)");
              break;
          }

          event = self.events.recv() => {
              match event {
                  Some(event) => self.on_event(&mut pending, event),
                  None => {
                      debug!("Debouncer shutting down (channel closed)");
                      break;
                  }
              }
          }

          _ = ticker.tick() => {
              self.flush_settled(&mut pending).await;
          }
      }
    }

    if !pending.is_empty() {
      debug!(pending = pending.len(), "Dropping unsettled changes on shutdown");
    }
  }

  fn on_event(&self, pending: &mut HashMap<PathBuf, PendingChange>, event: FsEvent) {
    trace!(path = %event.path.display(), kind = %event.kind, "Event");
    match pending.get_mut(&event.path) {
      Some(existing) => existing.update(event.kind),
      None => {
        pending.insert(event.path, PendingChange::new(event.kind));
      }
    }
  }

  async fn flush_settled(&self, pending: &mut HashMap<PathBuf, PendingChange>) {
    let now = Instant::now();
    let settled: Vec<PathBuf> = pending
      .iter()
      .filter(|(_, change)| now.duration_since(change.last_event) >= self.config.window)
      .map(|(path, _)| path.clone())
      .collect();

    for path in settled {
      if let Some(change) = pending.remove(&path) {
        self.settle(path, change).await;
      }
    }
  }

  async fn settle(&self, path: PathBuf, change: PendingChange) {
    if change.kind == EventKind::Removed {
      match self.state.forget(path.clone()).await {
        Ok(true) => debug!(path = %path.display(), "Removed from snapshot"),
        Ok(false) => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to forget removed path"),
      }
      return;
    }

    let metadata = match tokio::fs::metadata(&path).await {
      Ok(metadata) => metadata,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        debug!(path = %path.display(), "Gone before settling");
        return;
      }
      Err(e) => {
        warn!(path = %path.display(), error = %e, "Cannot stat settled path");
        return;
      }
    };

    if metadata.is_dir() {
      if self.config.recursive {
        self.scan_directory(path, change.first_seen).await;
      } else {
        self.settle_shallow_dir(path, change.first_seen).await;
      }
    } else if metadata.is_file() {
      let fingerprint = FileFingerprint::from_metadata(&metadata);
      self
        .offer(
          path,
          CandidateKind::File,
          fingerprint,
          Trigger::Event(change.kind),
          change.first_seen,
        )
        .await;
    }
  }

  /// One-time scan of a created or modified directory.
  async fn scan_directory(&self, dir: PathBuf, first_seen: SystemTime) {
    let recursive = self.config.recursive;
    let copy_empty_dirs = self.config.copy_empty_dirs;

    let scan_target = dir.clone();
    let entries = match tokio::task::spawn_blocking(move || {
      let mut entries = scan_dir(&scan_target, recursive, copy_empty_dirs);
      if copy_empty_dirs && is_empty_dir(&scan_target) {
        entries.push(ScanEntry {
          path: scan_target,
          kind: CandidateKind::EmptyDir,
          fingerprint: FileFingerprint::ZERO,
        });
      }
      entries
    })
    .await
    {
      Ok(entries) => entries,
      Err(e) => {
        error!(dir = %dir.display(), error = %e, "Directory scan failed");
        return;
      }
    };

    if entries.is_empty() {
      debug!(dir = %dir.display(), "Directory holds nothing to copy");
      return;
    }

    info!(dir = %dir.display(), entries = entries.len(), "Scanning directory");
    for entry in entries {
      self
        .offer(
          entry.path,
          entry.kind,
          entry.fingerprint,
          Trigger::DirectoryScan,
          first_seen,
        )
        .await;
    }
  }

  /// Non-recursive watching never looks inside subdirectories; only an empty
  /// one can become a candidate itself.
  async fn settle_shallow_dir(&self, dir: PathBuf, first_seen: SystemTime) {
    if !self.config.copy_empty_dirs {
      trace!(dir = %dir.display(), "Ignoring subdirectory (non-recursive)");
      return;
    }

    let probe = dir.clone();
    match tokio::task::spawn_blocking(move || is_empty_dir(&probe)).await {
      Ok(true) => {
        self
          .offer(
            dir,
            CandidateKind::EmptyDir,
            FileFingerprint::ZERO,
            Trigger::DirectoryScan,
            first_seen,
          )
          .await;
      }
      Ok(false) => trace!(dir = %dir.display(), "Ignoring subdirectory (non-recursive)"),
      Err(e) => error!(dir = %dir.display(), error = %e, "Directory check failed"),
    }
  }

  /// Apply the known-path filter and dispatch what survives.
  async fn offer(
    &self,
    path: PathBuf,
    kind: CandidateKind,
    fingerprint: FileFingerprint,
    trigger: Trigger,
    first_seen: SystemTime,
  ) {
    match self.state.is_known(&path, fingerprint).await {
      Ok(true) => {
        trace!(path = %path.display(), "Unchanged since snapshot");
        return;
      }
      Ok(false) => {}
      Err(e) => {
        warn!(path = %path.display(), error = %e, "State unavailable, dropping candidate");
        return;
      }
    }

    let Some(candidate) = self.router.route(path, kind, trigger, first_seen) else {
      return;
    };

    info!(
      source = %candidate.source.display(),
      destination = %candidate.destination.display(),
      trigger = %candidate.trigger,
      "Candidate discovered"
    );

    if let Err(e) = self.dispatch.dispatch(candidate).await {
      warn!(error = %e, "Dispatcher gone, dropping candidate");
    }
  }
}
