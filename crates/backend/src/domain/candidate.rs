//! Candidates - the in-flight unit of work - and their terminal outcomes.

use std::{
  fmt,
  path::PathBuf,
  time::{Duration, SystemTime},
};

/// What the filesystem reported for a path, after normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
  Created,
  Modified,
  Removed,
}

impl fmt::Display for EventKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      EventKind::Created => f.write_str("created"),
      EventKind::Modified => f.write_str("modified"),
      EventKind::Removed => f.write_str("removed"),
    }
  }
}

/// Whether a candidate is a regular file or an empty directory to materialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateKind {
  File,
  EmptyDir,
}

/// Why a candidate was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
  /// A settled filesystem event
  Event(EventKind),
  /// A create/modify on a directory scanned its contents
  DirectoryScan,
  /// The startup snapshot found a changed fingerprint for a known path
  Startup,
}

impl fmt::Display for Trigger {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Trigger::Event(kind) => write!(f, "{}", kind),
      Trigger::DirectoryScan => f.write_str("directory_scan"),
      Trigger::Startup => f.write_str("startup_modified"),
    }
  }
}

/// An in-flight unit of work.
///
/// Created when a debounce window closes, destroyed when its pipeline
/// terminates.
#[derive(Debug, Clone)]
pub struct Candidate {
  /// Absolute source path
  pub source: PathBuf,
  /// The watched root this source lives under
  pub root: PathBuf,
  /// Final destination path
  pub destination: PathBuf,
  pub kind: CandidateKind,
  pub trigger: Trigger,
  pub first_seen_at: SystemTime,
}

/// Pipeline position of a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateState {
  Pending,
  StabilityChecking,
  Hashing,
  Copying,
  Copied,
  Skipped,
  TimedOut,
  Vanished,
  Failed,
}

impl CandidateState {
  pub fn is_terminal(self) -> bool {
    matches!(
      self,
      Self::Copied | Self::Skipped | Self::TimedOut | Self::Vanished | Self::Failed
    )
  }
}

/// Why a candidate terminated without copying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
  /// Content identical to the last copy at this destination
  Duplicate,
  /// Excluded by include/exclude patterns
  Filtered,
  /// Larger than the configured size limit
  TooLarge,
  /// Dry run: would have copied
  DryRun,
}

/// Terminal result of one pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
  Copied { bytes: u64, elapsed: Duration },
  DirectoryCreated,
  Skipped(SkipReason),
  TimedOut,
  Vanished,
  Failed(String),
}

impl Outcome {
  pub fn state(&self) -> CandidateState {
    match self {
      Outcome::Copied { .. } | Outcome::DirectoryCreated => CandidateState::Copied,
      Outcome::Skipped(_) => CandidateState::Skipped,
      Outcome::TimedOut => CandidateState::TimedOut,
      Outcome::Vanished => CandidateState::Vanished,
      Outcome::Failed(_) => CandidateState::Failed,
    }
  }
}
