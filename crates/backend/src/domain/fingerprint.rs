//! File fingerprints and the path index built from them.
//!
//! A fingerprint is the cheap identity of a file: size, modification time and
//! the filesystem-assigned identity (inode on unix). Two fingerprints are equal
//! only when all three match, which distinguishes a truncated-and-rewritten file
//! from an untouched one even when size and mtime happen to collide.

use std::{
  collections::BTreeMap,
  fs::Metadata,
  path::{Path, PathBuf},
  time::UNIX_EPOCH,
};

use serde::{Deserialize, Serialize};

/// `{size, mtime, identity}` of a file, persisted as `[size, mtime, identity]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(u64, f64, u64)", into = "(u64, f64, u64)")]
pub struct FileFingerprint {
  /// Size in bytes
  pub size: u64,
  /// Modification time as epoch seconds
  pub mtime: f64,
  /// Filesystem identity (inode), 0 where the platform has none
  pub identity: u64,
}

impl FileFingerprint {
  /// Fingerprint recorded for empty directories.
  pub const ZERO: Self = Self {
    size: 0,
    mtime: 0.0,
    identity: 0,
  };

  /// Build a fingerprint from file metadata.
  pub fn from_metadata(metadata: &Metadata) -> Self {
    let mtime = metadata
      .modified()
      .ok()
      .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
      .map(|d| d.as_secs_f64())
      .unwrap_or(0.0);

    Self {
      size: metadata.len(),
      mtime,
      identity: identity_of(metadata),
    }
  }

  /// Stat a path and fingerprint it.
  pub fn of_path(path: &Path) -> std::io::Result<Self> {
    std::fs::metadata(path).map(|m| Self::from_metadata(&m))
  }
}

impl From<(u64, f64, u64)> for FileFingerprint {
  fn from((size, mtime, identity): (u64, f64, u64)) -> Self {
    Self { size, mtime, identity }
  }
}

impl From<FileFingerprint> for (u64, f64, u64) {
  fn from(fp: FileFingerprint) -> Self {
    (fp.size, fp.mtime, fp.identity)
  }
}

/// Inode number; the device is not part of the persisted identity
#[cfg(unix)]
fn identity_of(metadata: &Metadata) -> u64 {
  use std::os::unix::fs::MetadataExt;
  metadata.ino()
}

#[cfg(not(unix))]
fn identity_of(_metadata: &Metadata) -> u64 {
  0
}

/// Mapping of absolute path -> fingerprint.
///
/// Keys are the lossy string form of the absolute path so the persisted JSON
/// stays human-inspectable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PathIndex(BTreeMap<String, FileFingerprint>);

impl PathIndex {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
  }

  pub fn get(&self, path: &Path) -> Option<&FileFingerprint> {
    self.0.get(&Self::key(path))
  }

  /// True when the path is indexed with exactly this fingerprint.
  pub fn is_known(&self, path: &Path, fingerprint: &FileFingerprint) -> bool {
    self.get(path).is_some_and(|known| known == fingerprint)
  }

  pub fn insert(&mut self, path: &Path, fingerprint: FileFingerprint) -> Option<FileFingerprint> {
    self.0.insert(Self::key(path), fingerprint)
  }

  pub fn remove(&mut self, path: &Path) -> Option<FileFingerprint> {
    self.0.remove(&Self::key(path))
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = (PathBuf, &FileFingerprint)> {
    self.0.iter().map(|(k, v)| (PathBuf::from(k), v))
  }
}

impl FromIterator<(PathBuf, FileFingerprint)> for PathIndex {
  fn from_iter<I: IntoIterator<Item = (PathBuf, FileFingerprint)>>(iter: I) -> Self {
    Self(iter.into_iter().map(|(p, fp)| (Self::key(&p), fp)).collect())
  }
}

#[cfg(test)]
mod tests {
  use tempfile::TempDir;

  use super::*;

  #[test]
  fn test_fingerprint_serializes_as_triple() {
    let fp = FileFingerprint {
      size: 12,
      mtime: 1_700_000_000.25,
      identity: 42,
    };
    let json = serde_json::to_string(&fp).unwrap();
    assert_eq!(json, "[12,1700000000.25,42]");

    let back: FileFingerprint = serde_json::from_str(&json).unwrap();
    assert_eq!(back, fp);
  }

  #[test]
  fn test_fingerprint_equality_requires_all_fields() {
    let base = FileFingerprint {
      size: 10,
      mtime: 5.0,
      identity: 7,
    };
    assert_ne!(base, FileFingerprint { identity: 8, ..base });
    assert_ne!(base, FileFingerprint { size: 11, ..base });
    assert_ne!(base, FileFingerprint { mtime: 5.5, ..base });
    assert_eq!(base, FileFingerprint { ..base });
  }

  #[test]
  fn test_fingerprint_changes_when_file_grows() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("doc.pdf");
    std::fs::write(&path, b"one").unwrap();
    let before = FileFingerprint::of_path(&path).unwrap();

    std::fs::write(&path, b"one two").unwrap();
    let after = FileFingerprint::of_path(&path).unwrap();

    assert_eq!(before.size, 3);
    assert_eq!(after.size, 7);
    assert_ne!(before, after);
  }

  #[test]
  fn test_path_index_known_only_with_matching_fingerprint() {
    let mut index = PathIndex::new();
    let path = Path::new("/src/a.pdf");
    let fp = FileFingerprint {
      size: 1,
      mtime: 2.0,
      identity: 3,
    };
    index.insert(path, fp);

    assert!(index.is_known(path, &fp));
    assert!(!index.is_known(path, &FileFingerprint { size: 9, ..fp }));
    assert!(!index.is_known(Path::new("/src/b.pdf"), &fp));
  }

  #[cfg(unix)]
  #[test]
  fn test_identity_is_the_inode() {
    use std::os::unix::fs::MetadataExt;

    let temp = TempDir::new().unwrap();
    let path = temp.path().join("a.pdf");
    std::fs::write(&path, b"x").unwrap();

    let fp = FileFingerprint::of_path(&path).unwrap();
    assert_eq!(fp.identity, std::fs::metadata(&path).unwrap().ino());
  }
}
