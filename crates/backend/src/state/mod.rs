//! Persistent state: the startup snapshot and the destination hash cache.
//!
//! Both tables live as JSON files in the state directory and are rewritten in
//! full on every save through a temp file and rename, so readers only ever
//! observe a complete old version or a complete new one. An unreadable file is
//! moved aside and treated as empty.

pub mod hash_cache;
pub mod snapshot;

use std::{
  io::Write,
  path::{Path, PathBuf},
  time::{SystemTime, UNIX_EPOCH},
};

use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, info, warn};

pub use self::{
  hash_cache::{CacheEntry, HashCache},
  snapshot::{MergeReport, Snapshot},
};
use crate::actor::handle::SendError;

pub const SNAPSHOT_FILE: &str = "initial_snapshot.json";
pub const HASH_CACHE_FILE: &str = "hash_cache.json";

#[derive(Debug, thiserror::Error)]
pub enum StateError {
  #[error("Failed to write {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("Failed to encode state: {0}")]
  Encode(#[from] serde_json::Error),

  #[error("State writer task failed: {0}")]
  Join(String),

  #[error(transparent)]
  Unavailable(#[from] SendError),
}

/// Current wall-clock time as epoch seconds
pub fn epoch_now() -> f64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|d| d.as_secs_f64())
    .unwrap_or(0.0)
}

/// Replace `path` with `bytes` atomically.
///
/// The temp file is created next to the target so the final rename never
/// crosses a filesystem boundary.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
  let parent = path.parent().unwrap_or_else(|| Path::new("."));
  std::fs::create_dir_all(parent)?;

  let mut tmp = tempfile::Builder::new()
    .prefix(".state-")
    .suffix(".tmp")
    .tempfile_in(parent)?;
  tmp.write_all(bytes)?;
  tmp.as_file().sync_all()?;
  tmp.persist(path).map_err(|e| e.error)?;
  Ok(())
}

/// Load a JSON table, quarantining it when it cannot be parsed.
fn load_table<T>(path: &Path) -> T
where
  T: DeserializeOwned + Default,
{
  let bytes = match std::fs::read(path) {
    Ok(bytes) => bytes,
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
      debug!(path = %path.display(), "No state file yet");
      return T::default();
    }
    Err(e) => {
      warn!(path = %path.display(), error = %e, "State file unreadable, starting empty");
      return T::default();
    }
  };

  match serde_json::from_slice(&bytes) {
    Ok(table) => table,
    Err(e) => {
      let quarantine = quarantine_path(path);
      warn!(
        path = %path.display(),
        quarantine = %quarantine.display(),
        error = %e,
        "State file corrupt, moving aside and starting empty"
      );
      if let Err(e) = std::fs::rename(path, &quarantine) {
        warn!(path = %path.display(), error = %e, "Failed to quarantine corrupt state file");
      }
      T::default()
    }
  }
}

fn quarantine_path(path: &Path) -> PathBuf {
  let epoch = SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|d| d.as_secs())
    .unwrap_or(0);
  let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
  name.push(format!(".corrupt-{}", epoch));
  path.with_file_name(name)
}

fn encode<T: Serialize>(table: &T) -> Result<Vec<u8>, StateError> {
  Ok(serde_json::to_vec_pretty(table)?)
}

/// Both state tables, loaded from and saved to one directory.
#[derive(Debug)]
pub struct StateStore {
  dir: PathBuf,
  snapshot: Snapshot,
  cache: HashCache,
}

impl StateStore {
  /// Load both tables from `dir`. Missing or corrupt files yield empty tables.
  pub fn load(dir: &Path) -> Self {
    let snapshot: Snapshot = load_table(&dir.join(SNAPSHOT_FILE));
    let cache: HashCache = load_table(&dir.join(HASH_CACHE_FILE));

    info!(
      dir = %dir.display(),
      snapshot_entries = snapshot.data.len(),
      cache_entries = cache.len(),
      "State loaded"
    );

    Self {
      dir: dir.to_path_buf(),
      snapshot,
      cache,
    }
  }

  pub fn dir(&self) -> &Path {
    &self.dir
  }

  pub fn snapshot_path(&self) -> PathBuf {
    self.dir.join(SNAPSHOT_FILE)
  }

  pub fn cache_path(&self) -> PathBuf {
    self.dir.join(HASH_CACHE_FILE)
  }

  pub fn snapshot(&self) -> &Snapshot {
    &self.snapshot
  }

  pub fn cache(&self) -> &HashCache {
    &self.cache
  }

  pub fn snapshot_mut(&mut self) -> &mut Snapshot {
    &mut self.snapshot
  }

  pub fn cache_mut(&mut self) -> &mut HashCache {
    &mut self.cache
  }

  pub fn encode_snapshot(&self) -> Result<Vec<u8>, StateError> {
    encode(&self.snapshot)
  }

  pub fn encode_cache(&self) -> Result<Vec<u8>, StateError> {
    encode(&self.cache)
  }

  pub fn save_snapshot(&self) -> Result<(), StateError> {
    let path = self.snapshot_path();
    write_atomic(&path, &self.encode_snapshot()?).map_err(|source| StateError::Write { path, source })
  }

  pub fn save_cache(&self) -> Result<(), StateError> {
    let path = self.cache_path();
    write_atomic(&path, &self.encode_cache()?).map_err(|source| StateError::Write { path, source })
  }

  pub fn save_all(&self) -> Result<(), StateError> {
    self.save_snapshot()?;
    self.save_cache()
  }
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;
  use tempfile::TempDir;

  use super::*;
  use crate::domain::fingerprint::FileFingerprint;

  #[test]
  fn test_missing_files_load_empty() {
    let temp = TempDir::new().unwrap();
    let store = StateStore::load(temp.path());
    assert!(store.snapshot().data.is_empty());
    assert!(store.cache().is_empty());
  }

  #[test]
  fn test_save_and_reload() {
    let temp = TempDir::new().unwrap();
    let mut store = StateStore::load(temp.path());
    store.snapshot_mut().data.insert(
      Path::new("/src/a.pdf"),
      FileFingerprint {
        size: 3,
        mtime: 1.0,
        identity: 9,
      },
    );
    store.cache_mut().record(Path::new("/dest/a.pdf"), "abc", 2.0);
    store.save_all().unwrap();

    let reloaded = StateStore::load(temp.path());
    assert_eq!(reloaded.snapshot(), store.snapshot());
    assert_eq!(reloaded.cache().hash_for(Path::new("/dest/a.pdf")), Some("abc"));
  }

  #[test]
  fn test_corrupt_file_is_quarantined() {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join(HASH_CACHE_FILE), b"{ not json").unwrap();

    let store = StateStore::load(temp.path());
    assert!(store.cache().is_empty());
    assert!(!temp.path().join(HASH_CACHE_FILE).exists());

    let quarantined: Vec<_> = std::fs::read_dir(temp.path())
      .unwrap()
      .filter_map(|e| e.ok())
      .map(|e| e.file_name().to_string_lossy().into_owned())
      .filter(|n| n.starts_with("hash_cache.json.corrupt-"))
      .collect();
    assert_eq!(quarantined.len(), 1);
  }

  #[test]
  fn test_write_atomic_replaces_and_leaves_no_temp() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("table.json");
    write_atomic(&path, b"old").unwrap();
    write_atomic(&path, b"new").unwrap();

    assert_eq!(std::fs::read(&path).unwrap(), b"new");
    let entries = std::fs::read_dir(temp.path()).unwrap().count();
    assert_eq!(entries, 1);
  }
}
