//! Content-hash deduplication against the destination hash cache.
//!
//! Dedup is per destination path: identical bytes headed for a different
//! destination are still copied. The cache is only read here; it is updated
//! after a copy succeeds.

use std::{io::Read, path::Path};

use sha2::{Digest, Sha256};
use tracing::debug;

use super::error::PipelineError;
use crate::actor::handle::StateHandle;

const HASH_BUFFER: usize = 64 * 1024;

/// Whether a stable file needs copying, with the digest that decided it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupDecision {
  pub copy: bool,
  /// Lowercase hex SHA-256 of the file content
  pub hash: String,
}

/// Stream a file through SHA-256
pub fn hash_file(path: &Path) -> std::io::Result<String> {
  let mut file = std::fs::File::open(path)?;
  let mut hasher = Sha256::new();
  let mut buf = vec![0u8; HASH_BUFFER];

  loop {
    let n = file.read(&mut buf)?;
    if n == 0 {
      break;
    }
    hasher.update(&buf[..n]);
  }

  Ok(hex::encode(hasher.finalize()))
}

/// Compare a fresh digest with the one cached for the destination.
pub fn decide(hash: String, cached: Option<&str>) -> DedupDecision {
  let copy = cached != Some(hash.as_str());
  DedupDecision { copy, hash }
}

/// Hash `stable_path` and decide whether it must be copied to `destination`.
pub async fn should_copy(
  stable_path: &Path,
  destination: &Path,
  state: &StateHandle,
) -> Result<DedupDecision, PipelineError> {
  let path = stable_path.to_path_buf();
  let hash = tokio::task::spawn_blocking(move || hash_file(&path))
    .await
    .map_err(|e| PipelineError::io(stable_path, std::io::Error::other(e)))?
    .map_err(|e| PipelineError::io(stable_path, e))?;

  debug!(path = %stable_path.display(), hash = %hash, "Hash computed");

  let cached = state.cached_hash(destination).await?;
  Ok(decide(hash, cached.as_deref()))
}
