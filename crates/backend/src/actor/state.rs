//! StateActor - sole owner of the snapshot and hash cache.
//!
//! Workers, the debouncer and the janitor never touch the tables directly:
//! they send [`StateRequest`]s and the actor applies them one at a time. Each
//! mutation is persisted before the next message is read, so a copy record and
//! a prune can never interleave into a torn file.

use std::path::PathBuf;

use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, error, info};

use super::{
  handle::StateHandle,
  message::{StateRequest, StateStats},
};
use crate::state::{StateError, StateStore, epoch_now, write_atomic};

/// Which tables a mutation touched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tables {
  Snapshot,
  Cache,
  Both,
}

impl Tables {
  fn snapshot(self) -> bool {
    matches!(self, Tables::Snapshot | Tables::Both)
  }

  fn cache(self) -> bool {
    matches!(self, Tables::Cache | Tables::Both)
  }
}

pub struct StateActor {
  store: StateStore,
  rx: mpsc::Receiver<StateRequest>,
}

impl StateActor {
  /// Spawn the actor over an already loaded store.
  pub fn spawn(store: StateStore, buffer: usize) -> (StateHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    let actor = Self { store, rx };
    (StateHandle::new(tx), tokio::spawn(actor.run()))
  }

  async fn run(mut self) {
    debug!(dir = %self.store.dir().display(), "StateActor started");

    while let Some(request) = self.rx.recv().await {
      if let StateRequest::Shutdown { reply } = request {
        let result = self.persist(Tables::Both).await;
        let _ = reply.send(result);
        info!("StateActor stopped");
        return;
      }
      self.handle(request).await;
    }

    // Every handle dropped without an explicit shutdown
    if let Err(e) = self.persist(Tables::Both).await {
      error!(error = %e, "Final state flush failed");
    }
    debug!("StateActor stopped (channel closed)");
  }

  async fn handle(&mut self, request: StateRequest) {
    match request {
      StateRequest::IsKnown {
        path,
        fingerprint,
        reply,
      } => {
        let _ = reply.send(self.store.snapshot().data.is_known(&path, &fingerprint));
      }

      StateRequest::CachedHash { destination, reply } => {
        let _ = reply.send(self.store.cache().hash_for(&destination).map(String::from));
      }

      StateRequest::MergeScan { scanned, reply } => {
        let report = self.store.snapshot_mut().merge(scanned, epoch_now());
        let result = self.persist(Tables::Snapshot).await.map(|_| report);
        let _ = reply.send(result);
      }

      StateRequest::RecordCopy {
        source,
        fingerprint,
        destination,
        hash,
        reply,
      } => {
        let now = epoch_now();
        self.store.snapshot_mut().data.insert(&source, fingerprint);
        self.store.snapshot_mut().timestamp = now;
        self.store.cache_mut().record(&destination, hash, now);
        let _ = reply.send(self.persist(Tables::Both).await);
      }

      StateRequest::RecordDuplicate {
        source,
        fingerprint,
        destination,
        reply,
      } => {
        let now = epoch_now();
        self.store.snapshot_mut().data.insert(&source, fingerprint);
        self.store.snapshot_mut().timestamp = now;
        let tables = if self.store.cache_mut().touch(&destination, now) {
          Tables::Both
        } else {
          Tables::Snapshot
        };
        let _ = reply.send(self.persist(tables).await);
      }

      StateRequest::RecordKnown {
        path,
        fingerprint,
        reply,
      } => {
        self.store.snapshot_mut().data.insert(&path, fingerprint);
        self.store.snapshot_mut().timestamp = epoch_now();
        let _ = reply.send(self.persist(Tables::Snapshot).await);
      }

      StateRequest::Forget { path, reply } => {
        let removed = self.store.snapshot_mut().data.remove(&path).is_some();
        let result = if removed {
          self.store.snapshot_mut().timestamp = epoch_now();
          self.persist(Tables::Snapshot).await.map(|_| true)
        } else {
          Ok(false)
        };
        let _ = reply.send(result);
      }

      StateRequest::Prune { retention, reply } => {
        let removed = self.store.cache_mut().prune(retention, epoch_now());
        let result = if removed > 0 {
          self.persist(Tables::Cache).await.map(|_| removed)
        } else {
          Ok(0)
        };
        let _ = reply.send(result);
      }

      StateRequest::Stats { reply } => {
        let _ = reply.send(self.stats());
      }

      StateRequest::Flush { reply } => {
        let _ = reply.send(self.persist(Tables::Both).await);
      }

      StateRequest::Shutdown { reply } => {
        // Intercepted in `run`
        let _ = reply.send(self.persist(Tables::Both).await);
      }
    }
  }

  fn stats(&self) -> StateStats {
    let snapshot = self.store.snapshot();
    let cache = self.store.cache();
    StateStats {
      snapshot_entries: snapshot.data.len(),
      snapshot_timestamp: snapshot.timestamp,
      cache_entries: cache.len(),
      cache_timestamp: cache.timestamp,
      oldest_last_seen: cache.oldest_last_seen(),
    }
  }

  /// Encode the touched tables and write them off the async runtime.
  async fn persist(&self, tables: Tables) -> Result<(), StateError> {
    let mut writes: Vec<(PathBuf, Vec<u8>)> = Vec::with_capacity(2);
    if tables.snapshot() {
      writes.push((self.store.snapshot_path(), self.store.encode_snapshot()?));
    }
    if tables.cache() {
      writes.push((self.store.cache_path(), self.store.encode_cache()?));
    }

    let result = tokio::task::spawn_blocking(move || {
      for (path, bytes) in writes {
        write_atomic(&path, &bytes).map_err(|source| StateError::Write { path, source })?;
      }
      Ok(())
    })
    .await
    .map_err(|e| StateError::Join(e.to_string()))?;

    if let Err(ref e) = result {
      error!(error = %e, "Failed to persist state");
    }
    result
  }
}
