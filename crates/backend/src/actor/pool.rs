//! WorkerPool - bounded pipeline execution with a per-path single-flight guard
//!
//! A semaphore caps how many pipelines run at once. An in-flight map keyed by
//! source path guarantees that at most one pipeline per path exists at any
//! time: a candidate arriving for a busy path replaces whatever was queued
//! behind the running pipeline and runs once it finishes.
//!
//! ```text
//! submit(path) ──► in_flight[path] vacant?   ──► spawn slot, Started
//!                  occupied (running)        ──► queue behind it, Coalesced
//! slot done    ──► queued follow-up?         ──► run it in the same slot
//!                  none                      ──► remove in_flight[path]
//! ```

use std::{
  path::PathBuf,
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  time::Duration,
};

use async_trait::async_trait;
use dashmap::{DashMap, mapref::entry::Entry};
use tokio::sync::{Semaphore, mpsc};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, error, info, trace, warn};

use crate::domain::candidate::{Candidate, Outcome};

/// Runs one candidate to a terminal outcome.
#[async_trait]
pub trait CandidateRunner: Send + Sync + 'static {
  async fn run(&self, candidate: Candidate) -> Outcome;
}

/// What happened to a submitted candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
  /// A new pipeline was started for the path
  Started,
  /// A pipeline is running for the path; this candidate replaces any queued one
  Coalesced,
  /// The pool is shutting down
  Rejected,
}

struct Inner {
  runner: Arc<dyn CandidateRunner>,
  permits: Semaphore,
  /// source path -> follow-up candidate queued behind the running pipeline
  in_flight: DashMap<PathBuf, Option<Candidate>>,
  closed: AtomicBool,
  outcomes: Option<mpsc::UnboundedSender<(Candidate, Outcome)>>,
}

#[derive(Clone)]
pub struct WorkerPool {
  inner: Arc<Inner>,
  tracker: TaskTracker,
}

impl WorkerPool {
  pub fn new(runner: Arc<dyn CandidateRunner>, max_workers: usize) -> Self {
    Self::build(runner, max_workers, None)
  }

  /// Like [`WorkerPool::new`], also reporting every terminal outcome on `outcomes`.
  pub fn with_outcomes(
    runner: Arc<dyn CandidateRunner>,
    max_workers: usize,
    outcomes: mpsc::UnboundedSender<(Candidate, Outcome)>,
  ) -> Self {
    Self::build(runner, max_workers, Some(outcomes))
  }

  fn build(
    runner: Arc<dyn CandidateRunner>,
    max_workers: usize,
    outcomes: Option<mpsc::UnboundedSender<(Candidate, Outcome)>>,
  ) -> Self {
    Self {
      inner: Arc::new(Inner {
        runner,
        permits: Semaphore::new(max_workers.max(1)),
        in_flight: DashMap::new(),
        closed: AtomicBool::new(false),
        outcomes,
      }),
      tracker: TaskTracker::new(),
    }
  }

  /// Admit a candidate under the single-flight rule.
  pub fn submit(&self, candidate: Candidate) -> Admission {
    if self.inner.closed.load(Ordering::Acquire) {
      debug!(path = %candidate.source.display(), "Pool closed, rejecting candidate");
      return Admission::Rejected;
    }

    match self.inner.in_flight.entry(candidate.source.clone()) {
      Entry::Occupied(mut busy) => {
        trace!(path = %candidate.source.display(), "Path busy, queueing follow-up");
        busy.insert(Some(candidate));
        Admission::Coalesced
      }
      Entry::Vacant(slot) => {
        slot.insert(None);
        let inner = Arc::clone(&self.inner);
        self.tracker.spawn(run_slot(inner, candidate));
        Admission::Started
      }
    }
  }

  /// Paths with a running pipeline
  pub fn in_flight(&self) -> usize {
    self.inner.in_flight.len()
  }

  /// Stop admitting candidates and wait up to `grace` for running pipelines.
  ///
  /// Returns false when the grace period ran out. Pipelines still running are
  /// not cancelled.
  pub async fn shutdown(&self, grace: Duration) -> bool {
    self.inner.closed.store(true, Ordering::Release);
    self.tracker.close();

    let pending = self.in_flight();
    if pending > 0 {
      info!(in_flight = pending, grace = ?grace, "Draining worker pool");
    }

    match tokio::time::timeout(grace, self.tracker.wait()).await {
      Ok(()) => true,
      Err(_) => {
        warn!(in_flight = self.in_flight(), "Shutdown grace period elapsed with pipelines still running");
        false
      }
    }
  }

  /// Feed candidates from `rx` into the pool until cancelled or the channel closes.
  pub async fn dispatch(self, mut rx: mpsc::Receiver<Candidate>, cancel: CancellationToken) {
    debug!("Dispatcher started");
    loop {
      tokio::select! {
          biased;

          _ = cancel.cancelled() => {
              debug!("Dispatcher shutting down (cancelled)");
              break;
          }

          candidate = rx.recv() => {
              match candidate {
                  Some(candidate) => {
                      self.submit(candidate);
                  }
                  None => {
                      debug!("Dispatcher shutting down (channel closed)");
                      break;
                  }
              }
          }
      }
    }
  }
}

/// Own the path until no follow-up is queued.
async fn run_slot(inner: Arc<Inner>, mut candidate: Candidate) {
  let path = candidate.source.clone();

  loop {
    let outcome = match inner.permits.acquire().await {
      Ok(_permit) => run_isolated(&inner, candidate.clone()).await,
      Err(_) => Outcome::Failed("worker pool closed".to_string()),
    };

    if let Some(outcomes) = &inner.outcomes {
      let _ = outcomes.send((candidate, outcome));
    }

    // Check-and-release under the entry lock so a concurrent submit either
    // lands in the queue we are about to drain or starts a fresh slot.
    let next = match inner.in_flight.entry(path.clone()) {
      Entry::Occupied(mut entry) => match entry.get_mut().take() {
        Some(next) => Some(next),
        None => {
          entry.remove();
          None
        }
      },
      Entry::Vacant(_) => None,
    };

    match next {
      Some(next) => candidate = next,
      None => break,
    }
  }
}

/// Run the pipeline on its own task so a panic fails one candidate only.
async fn run_isolated(inner: &Arc<Inner>, candidate: Candidate) -> Outcome {
  let runner = Arc::clone(&inner.runner);
  let source = candidate.source.clone();

  match tokio::spawn(async move { runner.run(candidate).await }).await {
    Ok(outcome) => outcome,
    Err(e) => {
      error!(path = %source.display(), error = %e, "Pipeline task panicked");
      Outcome::Failed(format!("pipeline panicked: {}", e))
    }
  }
}
