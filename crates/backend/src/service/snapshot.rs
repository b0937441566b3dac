//! Source tree walking for the startup snapshot and directory events.

use std::path::{Path, PathBuf};

use tracing::{debug, trace, warn};

use crate::domain::{
  candidate::CandidateKind,
  fingerprint::{FileFingerprint, PathIndex},
};

/// One regular file or empty directory found under a root
#[derive(Debug, Clone, PartialEq)]
pub struct ScanEntry {
  pub path: PathBuf,
  pub kind: CandidateKind,
  pub fingerprint: FileFingerprint,
}

/// Walk `dir` and fingerprint what it contains.
///
/// Regular files are always recorded. Directories are recorded only when
/// `copy_empty_dirs` is set and they have no entries, with a zero fingerprint.
/// Symlinks are not followed. Unreadable entries are logged and skipped.
pub fn scan_dir(dir: &Path, recursive: bool, copy_empty_dirs: bool) -> Vec<ScanEntry> {
  let walker = walkdir::WalkDir::new(dir)
    .min_depth(1)
    .max_depth(if recursive { usize::MAX } else { 1 })
    .follow_links(false);

  let mut entries = Vec::new();
  for entry in walker {
    let entry = match entry {
      Ok(entry) => entry,
      Err(e) => {
        warn!(dir = %dir.display(), error = %e, "Skipping unreadable entry");
        continue;
      }
    };

    let file_type = entry.file_type();
    if file_type.is_file() {
      match entry.metadata() {
        Ok(metadata) => entries.push(ScanEntry {
          path: entry.into_path(),
          kind: CandidateKind::File,
          fingerprint: FileFingerprint::from_metadata(&metadata),
        }),
        Err(e) => warn!(path = %entry.path().display(), error = %e, "Cannot stat file"),
      }
    } else if file_type.is_dir() && copy_empty_dirs && is_empty_dir(entry.path()) {
      trace!(path = %entry.path().display(), "Empty directory");
      entries.push(ScanEntry {
        path: entry.into_path(),
        kind: CandidateKind::EmptyDir,
        fingerprint: FileFingerprint::ZERO,
      });
    }
  }

  entries
}

/// Fingerprint every root into one index.
pub fn build_snapshot(roots: &[PathBuf], recursive: bool, copy_empty_dirs: bool) -> PathIndex {
  let index: PathIndex = roots
    .iter()
    .flat_map(|root| scan_dir(root, recursive, copy_empty_dirs))
    .map(|entry| (entry.path, entry.fingerprint))
    .collect();

  debug!(roots = roots.len(), entries = index.len(), "Source snapshot built");
  index
}

pub fn is_empty_dir(path: &Path) -> bool {
  std::fs::read_dir(path).is_ok_and(|mut entries| entries.next().is_none())
}
