//! Destination hash cache.
//!
//! Maps each destination path to the digest of the content last copied there.
//! An entry is absent until the first successful copy to that path.

use std::{collections::BTreeMap, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

/// Cached digest for one destination path
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
  /// Lowercase hex SHA-256 of the copied content
  pub hash: String,
  /// Epoch seconds of the last copy or duplicate sighting
  pub last_seen: f64,
}

/// On-disk form: `data` keeps the plain `path -> digest` layout, `last_seen`
/// sits beside it so older files without it still load.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct HashCacheFile {
  #[serde(default)]
  timestamp: f64,
  #[serde(default)]
  data: BTreeMap<String, String>,
  #[serde(default)]
  last_seen: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "HashCacheFile", into = "HashCacheFile")]
pub struct HashCache {
  /// Epoch seconds of the last mutation
  pub timestamp: f64,
  entries: BTreeMap<String, CacheEntry>,
}

impl From<HashCacheFile> for HashCache {
  fn from(file: HashCacheFile) -> Self {
    let entries = file
      .data
      .into_iter()
      .map(|(path, hash)| {
        let last_seen = file.last_seen.get(&path).copied().unwrap_or(file.timestamp);
        (path, CacheEntry { hash, last_seen })
      })
      .collect();

    Self {
      timestamp: file.timestamp,
      entries,
    }
  }
}

impl From<HashCache> for HashCacheFile {
  fn from(cache: HashCache) -> Self {
    let mut data = BTreeMap::new();
    let mut last_seen = BTreeMap::new();
    for (path, entry) in cache.entries {
      last_seen.insert(path.clone(), entry.last_seen);
      data.insert(path, entry.hash);
    }
    Self {
      timestamp: cache.timestamp,
      data,
      last_seen,
    }
  }
}

impl HashCache {
  fn key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
  }

  pub fn get(&self, destination: &Path) -> Option<&CacheEntry> {
    self.entries.get(&Self::key(destination))
  }

  /// Digest last copied to `destination`
  pub fn hash_for(&self, destination: &Path) -> Option<&str> {
    self.get(destination).map(|e| e.hash.as_str())
  }

  /// Record a successful copy
  pub fn record(&mut self, destination: &Path, hash: impl Into<String>, now: f64) {
    self.entries.insert(
      Self::key(destination),
      CacheEntry {
        hash: hash.into(),
        last_seen: now,
      },
    );
    self.timestamp = now;
  }

  /// Refresh `last_seen` for an existing entry. Returns false when absent.
  pub fn touch(&mut self, destination: &Path, now: f64) -> bool {
    match self.entries.get_mut(&Self::key(destination)) {
      Some(entry) => {
        entry.last_seen = now;
        self.timestamp = now;
        true
      }
      None => false,
    }
  }

  /// Drop entries not seen within `retention`. A zero retention keeps everything.
  ///
  /// Returns the number of entries removed.
  pub fn prune(&mut self, retention: Duration, now: f64) -> usize {
    if retention.is_zero() {
      return 0;
    }

    let cutoff = now - retention.as_secs_f64();
    let before = self.entries.len();
    self.entries.retain(|_, entry| entry.last_seen >= cutoff);

    let removed = before - self.entries.len();
    if removed > 0 {
      self.timestamp = now;
    }
    removed
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Oldest `last_seen` across all entries
  pub fn oldest_last_seen(&self) -> Option<f64> {
    self.entries.values().map(|e| e.last_seen).reduce(f64::min)
  }
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;

  const DAY: f64 = 24.0 * 3600.0;

  #[test]
  fn test_prune_removes_entries_older_than_retention() {
    let now = 100.0 * DAY;
    let mut cache = HashCache::default();
    cache.record(Path::new("/dest/old.pdf"), "aa", now - 40.0 * DAY);
    cache.record(Path::new("/dest/fresh.pdf"), "bb", now - DAY);

    let removed = cache.prune(Duration::from_secs(30 * 24 * 3600), now);

    assert_eq!(removed, 1);
    assert!(cache.get(Path::new("/dest/old.pdf")).is_none());
    assert_eq!(cache.hash_for(Path::new("/dest/fresh.pdf")), Some("bb"));
  }

  #[test]
  fn test_prune_disabled_with_zero_retention() {
    let mut cache = HashCache::default();
    cache.record(Path::new("/dest/ancient.pdf"), "aa", 0.0);

    assert_eq!(cache.prune(Duration::ZERO, 1_000.0 * DAY), 0);
    assert!(cache.get(Path::new("/dest/ancient.pdf")).is_some());
  }

  #[test]
  fn test_touch_keeps_entry_alive() {
    let now = 50.0 * DAY;
    let mut cache = HashCache::default();
    cache.record(Path::new("/dest/a.pdf"), "aa", now - 40.0 * DAY);
    assert!(cache.touch(Path::new("/dest/a.pdf"), now));
    assert!(!cache.touch(Path::new("/dest/missing.pdf"), now));

    assert_eq!(cache.prune(Duration::from_secs(30 * 24 * 3600), now), 0);
  }

  #[test]
  fn test_json_layout_keeps_plain_digest_mapping() {
    let mut cache = HashCache::default();
    cache.record(Path::new("/dest/a.pdf"), "abc123", 5.0);

    let value = serde_json::to_value(&cache).unwrap();
    assert_eq!(
      value,
      serde_json::json!({
        "timestamp": 5.0,
        "data": { "/dest/a.pdf": "abc123" },
        "last_seen": { "/dest/a.pdf": 5.0 }
      })
    );
  }

  #[test]
  fn test_loads_file_without_last_seen() {
    let cache: HashCache =
      serde_json::from_str(r#"{ "timestamp": 42.0, "data": { "/dest/a.pdf": "ff" } }"#).unwrap();

    let entry = cache.get(Path::new("/dest/a.pdf")).unwrap();
    assert_eq!(entry.hash, "ff");
    assert_eq!(entry.last_seen, 42.0);
  }
}
