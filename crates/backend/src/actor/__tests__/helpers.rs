//! Test helpers for actor integration tests.
//!
//! `TestContext` owns scratch source, destination and state directories and
//! builds configs, pipelines and candidates with timings short enough for
//! tests.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
  time::{Duration, Instant, SystemTime},
};

use tempfile::TempDir;
use tokio::task::JoinHandle;

use crate::{
  actor::{CandidateRouter, Pipeline, PipelineSettings, PipelineStats, StateActor, handle::StateHandle},
  domain::{
    candidate::{Candidate, CandidateKind, Trigger},
    config::{Config, FilterConfig},
  },
  service::{copy::DestinationLayout, filter::FileFilter},
  state::StateStore,
};

pub struct TestContext {
  pub source: TempDir,
  pub dest: TempDir,
  pub state: TempDir,
}

impl TestContext {
  pub fn new() -> Self {
    Self {
      source: TempDir::new().expect("create source temp dir"),
      dest: TempDir::new().expect("create dest temp dir"),
      state: TempDir::new().expect("create state temp dir"),
    }
  }

  /// Canonical source root, as the daemon stores it
  pub fn source_root(&self) -> PathBuf {
    self.source.path().canonicalize().expect("canonical source")
  }

  pub fn dest_root(&self) -> PathBuf {
    self.dest.path().canonicalize().expect("canonical dest")
  }

  pub fn src(&self, rel: &str) -> PathBuf {
    self.source_root().join(rel)
  }

  pub fn dst(&self, rel: &str) -> PathBuf {
    self.dest_root().join(rel)
  }

  pub fn write(&self, rel: &str, bytes: &[u8]) -> PathBuf {
    let path = self.src(rel);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).expect("create parent");
    }
    std::fs::write(&path, bytes).expect("write source file");
    path
  }

  /// Daemon config with a polling watcher and the 1s / 0.5s x2 timings
  pub fn config(&self) -> Config {
    let mut config = Config {
      sources: vec![self.source_root()],
      dest: self.dest_root(),
      state_dir: self.state.path().to_path_buf(),
      ..Default::default()
    };
    config.watch.use_polling = true;
    config.watch.poll_interval_secs = 0.1;
    config.watch.debounce_secs = 1.0;
    config.stability.interval_secs = 0.5;
    config.stability.stable_rounds = 2;
    config.stability.copy_timeout_secs = 10;
    config.workers.shutdown_grace_secs = 10;
    config
  }

  pub fn spawn_state(&self) -> (StateHandle, JoinHandle<()>) {
    StateActor::spawn(StateStore::load(self.state.path()), 64)
  }

  pub fn router(&self, preserve_dirs: bool, compress: bool) -> CandidateRouter {
    CandidateRouter::new(
      vec![self.source_root()],
      DestinationLayout::new(self.dest_root(), preserve_dirs, compress),
    )
  }

  pub fn candidate(&self, router: &CandidateRouter, path: &Path, kind: CandidateKind) -> Candidate {
    router
      .route(path.to_path_buf(), kind, Trigger::DirectoryScan, SystemTime::now())
      .expect("routable candidate")
  }
}

/// Fast pipeline settings: 50ms polls, 2 rounds, 2s timeout
pub fn fast_settings() -> PipelineSettings {
  PipelineSettings {
    stability_interval: Duration::from_millis(50),
    stable_rounds: 2,
    copy_timeout: Duration::from_secs(2),
    compress: false,
    dry_run: false,
    delete_source: false,
  }
}

pub fn build_pipeline(
  state: &StateHandle,
  settings: PipelineSettings,
  filter: &FilterConfig,
) -> (Pipeline, Arc<PipelineStats>) {
  let stats = Arc::new(PipelineStats::default());
  let filter = FileFilter::from_config(filter).expect("valid patterns");
  (
    Pipeline::new(settings, filter, state.clone(), None, Arc::clone(&stats)),
    stats,
  )
}

/// Poll `check` until it holds or `timeout` elapses.
pub async fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
  let deadline = Instant::now() + timeout;
  while Instant::now() < deadline {
    if check() {
      return true;
    }
    tokio::time::sleep(Duration::from_millis(25)).await;
  }
  check()
}
