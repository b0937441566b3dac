//! Messages accepted by the state actor.
//!
//! Every request carries a `oneshot` reply channel. Mutating requests reply
//! only after the affected table has been persisted.

use std::{path::PathBuf, time::Duration};

use tokio::sync::oneshot;

use crate::{
  domain::fingerprint::{FileFingerprint, PathIndex},
  state::{MergeReport, StateError},
};

/// Sizes and ages of the persisted tables
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateStats {
  pub snapshot_entries: usize,
  pub snapshot_timestamp: f64,
  pub cache_entries: usize,
  pub cache_timestamp: f64,
  pub oldest_last_seen: Option<f64>,
}

#[derive(Debug)]
pub enum StateRequest {
  /// Is `path` in the snapshot with exactly this fingerprint?
  IsKnown {
    path: PathBuf,
    fingerprint: FileFingerprint,
    reply: oneshot::Sender<bool>,
  },
  /// Digest last copied to `destination`
  CachedHash {
    destination: PathBuf,
    reply: oneshot::Sender<Option<String>>,
  },
  /// Merge a fresh source scan into the snapshot and persist it
  MergeScan {
    scanned: PathIndex,
    reply: oneshot::Sender<Result<MergeReport, StateError>>,
  },
  /// A copy succeeded: remember the source fingerprint and destination digest
  RecordCopy {
    source: PathBuf,
    fingerprint: FileFingerprint,
    destination: PathBuf,
    hash: String,
    reply: oneshot::Sender<Result<(), StateError>>,
  },
  /// Content matched the cache: remember the source and refresh `last_seen`
  RecordDuplicate {
    source: PathBuf,
    fingerprint: FileFingerprint,
    destination: PathBuf,
    reply: oneshot::Sender<Result<(), StateError>>,
  },
  /// Mark a path as known without a copy (empty directories)
  RecordKnown {
    path: PathBuf,
    fingerprint: FileFingerprint,
    reply: oneshot::Sender<Result<(), StateError>>,
  },
  /// Drop a path from the snapshot
  Forget {
    path: PathBuf,
    reply: oneshot::Sender<Result<bool, StateError>>,
  },
  /// Remove cache entries older than `retention`
  Prune {
    retention: Duration,
    reply: oneshot::Sender<Result<usize, StateError>>,
  },
  Stats {
    reply: oneshot::Sender<StateStats>,
  },
  /// Persist both tables
  Flush {
    reply: oneshot::Sender<Result<(), StateError>>,
  },
  /// Persist both tables and stop
  Shutdown {
    reply: oneshot::Sender<Result<(), StateError>>,
  },
}
