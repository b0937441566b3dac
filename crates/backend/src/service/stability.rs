//! Size-polling stability detection.
//!
//! A filesystem notification fires on the first write, not the last. A file is
//! considered complete once its size has been unchanged for a number of
//! consecutive polls.

use std::{path::Path, time::Duration};

use tracing::trace;

/// Result of waiting for a file to settle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stability {
  Stable { size: u64 },
  TimedOut,
  Vanished,
}

/// Poll `path` every `interval` until its size is unchanged for
/// `required_rounds` consecutive polls.
///
/// Gives up with [`Stability::TimedOut`] once `timeout` has elapsed and with
/// [`Stability::Vanished`] if the file disappears. Other stat failures are
/// returned as errors.
pub async fn wait_until_stable(
  path: &Path,
  interval: Duration,
  required_rounds: u32,
  timeout: Duration,
) -> std::io::Result<Stability> {
  match tokio::time::timeout(timeout, poll_until_stable(path, interval, required_rounds)).await {
    Ok(result) => result,
    Err(_) => Ok(Stability::TimedOut),
  }
}

async fn poll_until_stable(path: &Path, interval: Duration, required_rounds: u32) -> std::io::Result<Stability> {
  let mut last_size: Option<u64> = None;
  let mut stable_rounds = 0u32;

  loop {
    let size = match tokio::fs::metadata(path).await {
      Ok(metadata) => metadata.len(),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Stability::Vanished),
      Err(e) => return Err(e),
    };

    if last_size == Some(size) {
      stable_rounds += 1;
      if stable_rounds >= required_rounds {
        return Ok(Stability::Stable { size });
      }
    } else {
      trace!(path = %path.display(), size, "Size changed, resetting stability count");
      stable_rounds = 0;
      last_size = Some(size);
    }

    tokio::time::sleep(interval).await;
  }
}
