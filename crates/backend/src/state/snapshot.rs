//! Startup snapshot table.
//!
//! Records which files existed, and with which fingerprint, when the service
//! started. A path present here is never treated as newly created unless its
//! fingerprint changes.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::domain::fingerprint::PathIndex;

/// `{ "timestamp": <epoch-seconds>, "data": { "<path>": [size, mtime, identity] } }`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
  #[serde(default)]
  pub timestamp: f64,
  #[serde(default)]
  pub data: PathIndex,
}

/// What merging a fresh scan into the prior snapshot found
#[derive(Debug, Default)]
pub struct MergeReport {
  /// Paths whose fingerprint matched the prior snapshot
  pub known: usize,
  /// Paths absent from the prior snapshot, now recorded as pre-existing
  pub added: usize,
  /// Paths whose fingerprint changed since the prior snapshot
  pub modified: Vec<PathBuf>,
  /// Prior entries no longer present on disk
  pub removed: usize,
}

impl Snapshot {
  /// Merge a fresh scan of the source roots into this snapshot.
  ///
  /// Unchanged paths stay known and new paths become known. Paths with a
  /// changed fingerprint are reported as modification candidates and keep
  /// their old fingerprint until a pipeline run records the new one, so a
  /// failed copy is retried on the next start. Entries that vanished from
  /// disk are dropped.
  pub fn merge(&mut self, scanned: PathIndex, now: f64) -> MergeReport {
    let mut report = MergeReport::default();
    let mut merged = PathIndex::new();

    for (path, fingerprint) in scanned.iter() {
      match self.data.get(&path) {
        Some(prior) if prior == fingerprint => {
          report.known += 1;
          merged.insert(&path, *prior);
        }
        Some(prior) => {
          merged.insert(&path, *prior);
          report.modified.push(path);
        }
        None => {
          report.added += 1;
          merged.insert(&path, *fingerprint);
        }
      }
    }

    report.removed = self.data.len() - (report.known + report.modified.len());
    self.data = merged;
    self.timestamp = now;
    report
  }
}
