//! Actor handles
//!
//! Handles are cheap to clone and wrap the channel sender of an actor, turning
//! request/reply round trips into plain async methods.

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use tokio::sync::{mpsc, oneshot};

use super::message::{StateRequest, StateStats};
use crate::{
  domain::{
    candidate::Candidate,
    fingerprint::{FileFingerprint, PathIndex},
  },
  state::{MergeReport, StateError},
};

// ============================================================================
// State Handle
// ============================================================================

/// Handle to the state actor, the single mutation path for persisted state.
#[derive(Clone, Debug)]
pub struct StateHandle {
  tx: mpsc::Sender<StateRequest>,
}

impl StateHandle {
  pub fn new(tx: mpsc::Sender<StateRequest>) -> Self {
    Self { tx }
  }

  async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> StateRequest) -> Result<T, SendError> {
    let (reply, rx) = oneshot::channel();
    self.tx.send(build(reply)).await.map_err(|_| SendError::ActorGone)?;
    rx.await.map_err(|_| SendError::ActorGone)
  }

  pub async fn is_known(&self, path: &Path, fingerprint: FileFingerprint) -> Result<bool, SendError> {
    let path = path.to_path_buf();
    self
      .request(|reply| StateRequest::IsKnown {
        path,
        fingerprint,
        reply,
      })
      .await
  }

  pub async fn cached_hash(&self, destination: &Path) -> Result<Option<String>, SendError> {
    let destination = destination.to_path_buf();
    self
      .request(|reply| StateRequest::CachedHash { destination, reply })
      .await
  }

  pub async fn merge_scan(&self, scanned: PathIndex) -> Result<MergeReport, StateError> {
    self.request(|reply| StateRequest::MergeScan { scanned, reply }).await?
  }

  pub async fn record_copy(
    &self,
    source: PathBuf,
    fingerprint: FileFingerprint,
    destination: PathBuf,
    hash: String,
  ) -> Result<(), StateError> {
    self
      .request(|reply| StateRequest::RecordCopy {
        source,
        fingerprint,
        destination,
        hash,
        reply,
      })
      .await?
  }

  pub async fn record_duplicate(
    &self,
    source: PathBuf,
    fingerprint: FileFingerprint,
    destination: PathBuf,
  ) -> Result<(), StateError> {
    self
      .request(|reply| StateRequest::RecordDuplicate {
        source,
        fingerprint,
        destination,
        reply,
      })
      .await?
  }

  pub async fn record_known(&self, path: PathBuf, fingerprint: FileFingerprint) -> Result<(), StateError> {
    self
      .request(|reply| StateRequest::RecordKnown {
        path,
        fingerprint,
        reply,
      })
      .await?
  }

  /// Returns whether the path was in the snapshot
  pub async fn forget(&self, path: PathBuf) -> Result<bool, StateError> {
    self.request(|reply| StateRequest::Forget { path, reply }).await?
  }

  /// Returns the number of cache entries removed
  pub async fn prune(&self, retention: Duration) -> Result<usize, StateError> {
    self.request(|reply| StateRequest::Prune { retention, reply }).await?
  }

  pub async fn stats(&self) -> Result<StateStats, SendError> {
    self.request(|reply| StateRequest::Stats { reply }).await
  }

  pub async fn flush(&self) -> Result<(), StateError> {
    self.request(|reply| StateRequest::Flush { reply }).await?
  }

  /// Persist everything and stop the actor
  pub async fn shutdown(&self) -> Result<(), StateError> {
    self.request(|reply| StateRequest::Shutdown { reply }).await?
  }
}

// ============================================================================
// Dispatch Handle
// ============================================================================

/// Handle for feeding settled candidates to the worker pool dispatcher.
#[derive(Clone, Debug)]
pub struct DispatchHandle {
  tx: mpsc::Sender<Candidate>,
}

impl DispatchHandle {
  pub fn new(tx: mpsc::Sender<Candidate>) -> Self {
    Self { tx }
  }

  pub async fn dispatch(&self, candidate: Candidate) -> Result<(), SendError> {
    self.tx.send(candidate).await.map_err(|_| SendError::ActorGone)
  }
}

// ============================================================================
// Errors
// ============================================================================

/// Error when sending to an actor
#[derive(Debug, Clone, thiserror::Error)]
pub enum SendError {
  #[error("Actor has shut down")]
  ActorGone,
}
