//! EventIngest - bridges the OS watcher to the debouncer
//!
//! notify's callbacks run on its own thread and use `blocking_send` to push
//! normalized [`FsEvent`]s into a bounded channel. The channel is the only
//! interface the rest of the pipeline sees, so native and polling watchers are
//! interchangeable and tests can feed events directly.
//!
//! Events are assumed to be late, duplicated or coalesced; nothing downstream
//! relies on their order or count.

use std::path::{Path, PathBuf};

use notify::{
  Config as NotifyConfig, Event, EventKind as NotifyKind, PollWatcher, RecommendedWatcher, RecursiveMode, Watcher,
  event::{AccessKind, AccessMode, ModifyKind, RenameMode},
};
use tokio::sync::mpsc;
use tracing::{info, trace, warn};

use crate::domain::{candidate::EventKind, config::WatchConfig};

/// Errors that can occur while starting the watcher
#[derive(Debug, thiserror::Error)]
pub enum WatcherError {
  #[error("Failed to initialize watcher: {0}")]
  Init(#[source] notify::Error),

  #[error("Failed to watch {path}: {source}")]
  Watch {
    path: PathBuf,
    #[source]
    source: notify::Error,
  },
}

/// A normalized `(path, kind)` filesystem event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEvent {
  pub path: PathBuf,
  pub kind: EventKind,
}

impl FsEvent {
  pub fn new(path: impl Into<PathBuf>, kind: EventKind) -> Self {
    Self {
      path: path.into(),
      kind,
    }
  }
}

/// Map a raw notify event onto zero or more normalized events.
pub fn normalize(event: Event) -> Vec<FsEvent> {
  let kind = match event.kind {
    NotifyKind::Create(_) => EventKind::Created,
    NotifyKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
      // paths[0] = from, paths[1] = to
      let mut paths = event.paths.into_iter();
      return match (paths.next(), paths.next()) {
        (Some(from), Some(to)) => vec![
          FsEvent::new(from, EventKind::Removed),
          FsEvent::new(to, EventKind::Created),
        ],
        (Some(only), None) => vec![FsEvent::new(only, EventKind::Modified)],
        _ => Vec::new(),
      };
    }
    NotifyKind::Modify(ModifyKind::Name(RenameMode::From)) => EventKind::Removed,
    NotifyKind::Modify(ModifyKind::Name(RenameMode::To)) => EventKind::Created,
    NotifyKind::Modify(_) => EventKind::Modified,
    NotifyKind::Access(AccessKind::Close(AccessMode::Write)) => EventKind::Modified,
    NotifyKind::Remove(_) => EventKind::Removed,
    NotifyKind::Access(_) | NotifyKind::Any | NotifyKind::Other => {
      trace!(kind = ?event.kind, "Ignoring event");
      return Vec::new();
    }
  };

  event.paths.into_iter().map(|path| FsEvent::new(path, kind)).collect()
}

/// Running OS watcher. Dropping it stops event delivery and closes the
/// channel once the callback is gone.
pub struct EventIngest {
  // The notify watcher must be held to keep it alive
  _watcher: Box<dyn Watcher + Send>,
}

impl EventIngest {
  /// Start watching every root, forwarding normalized events to `tx`.
  pub fn start(roots: &[PathBuf], config: &WatchConfig, tx: mpsc::Sender<FsEvent>) -> Result<Self, WatcherError> {
    let handler = move |res: notify::Result<Event>| match res {
      Ok(event) => {
        for fs_event in normalize(event) {
          // This runs on notify's thread - use blocking_send
          if tx.blocking_send(fs_event).is_err() {
            return;
          }
        }
      }
      Err(e) => warn!(error = %e, "Watcher error"),
    };

    let poll_interval = config.poll_interval();
    let notify_config = NotifyConfig::default().with_poll_interval(poll_interval);

    let mut watcher: Box<dyn Watcher + Send> = if config.use_polling {
      info!(interval = ?poll_interval, "Using polling watcher");
      Box::new(PollWatcher::new(handler, notify_config).map_err(WatcherError::Init)?)
    } else {
      Box::new(RecommendedWatcher::new(handler, notify_config).map_err(WatcherError::Init)?)
    };

    let mode = if config.recursive {
      RecursiveMode::Recursive
    } else {
      RecursiveMode::NonRecursive
    };

    for root in roots {
      watcher.watch(root, mode).map_err(|source| WatcherError::Watch {
        path: root.clone(),
        source,
      })?;
      info!(root = %root.display(), recursive = config.recursive, "Watching");
    }

    Ok(Self { _watcher: watcher })
  }
}

/// The watched root owning `path`, preferring the most specific one.
pub fn owning_root<'a>(roots: &'a [PathBuf], path: &Path) -> Option<&'a PathBuf> {
  roots
    .iter()
    .filter(|root| path.starts_with(root))
    .max_by_key(|root| root.components().count())
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use notify::event::{CreateKind, DataChange, RemoveKind};
  use pretty_assertions::assert_eq;
  use tempfile::TempDir;

  use super::*;

  fn event(kind: NotifyKind, paths: &[&str]) -> Event {
    paths
      .iter()
      .fold(Event::new(kind), |event, p| event.add_path(PathBuf::from(p)))
  }

  #[test]
  fn test_normalize_create_modify_remove() {
    assert_eq!(
      normalize(event(NotifyKind::Create(CreateKind::File), &["/src/a"])),
      vec![FsEvent::new("/src/a", EventKind::Created)]
    );
    assert_eq!(
      normalize(event(
        NotifyKind::Modify(ModifyKind::Data(DataChange::Content)),
        &["/src/a"]
      )),
      vec![FsEvent::new("/src/a", EventKind::Modified)]
    );
    assert_eq!(
      normalize(event(NotifyKind::Remove(RemoveKind::File), &["/src/a"])),
      vec![FsEvent::new("/src/a", EventKind::Removed)]
    );
  }

  #[test]
  fn test_normalize_renames() {
    assert_eq!(
      normalize(event(
        NotifyKind::Modify(ModifyKind::Name(RenameMode::Both)),
        &["/src/old", "/src/new"]
      )),
      vec![
        FsEvent::new("/src/old", EventKind::Removed),
        FsEvent::new("/src/new", EventKind::Created),
      ]
    );
    assert_eq!(
      normalize(event(NotifyKind::Modify(ModifyKind::Name(RenameMode::To)), &["/src/in"])),
      vec![FsEvent::new("/src/in", EventKind::Created)]
    );
    assert_eq!(
      normalize(event(NotifyKind::Modify(ModifyKind::Name(RenameMode::From)), &["/src/out"])),
      vec![FsEvent::new("/src/out", EventKind::Removed)]
    );
  }

  #[test]
  fn test_normalize_close_write_and_ignored_access() {
    assert_eq!(
      normalize(event(NotifyKind::Access(AccessKind::Close(AccessMode::Write)), &["/src/a"])),
      vec![FsEvent::new("/src/a", EventKind::Modified)]
    );
    assert!(normalize(event(NotifyKind::Access(AccessKind::Read), &["/src/a"])).is_empty());
    assert!(normalize(event(NotifyKind::Any, &["/src/a"])).is_empty());
  }

  #[test]
  fn test_owning_root_prefers_most_specific() {
    let roots = vec![PathBuf::from("/data"), PathBuf::from("/data/scans")];
    assert_eq!(
      owning_root(&roots, Path::new("/data/scans/a.pdf")),
      Some(&PathBuf::from("/data/scans"))
    );
    assert_eq!(owning_root(&roots, Path::new("/data/a.pdf")), Some(&PathBuf::from("/data")));
    assert_eq!(owning_root(&roots, Path::new("/elsewhere/a.pdf")), None);
  }

  #[tokio::test]
  async fn test_polling_ingest_reports_new_file() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().canonicalize().unwrap();
    let config = WatchConfig {
      use_polling: true,
      poll_interval_secs: 0.05,
      ..Default::default()
    };

    let (tx, mut rx) = mpsc::channel(64);
    let _ingest = EventIngest::start(std::slice::from_ref(&root), &config, tx).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    std::fs::write(root.join("new.pdf"), b"hello").unwrap();

    let found = tokio::time::timeout(Duration::from_secs(5), async {
      while let Some(event) = rx.recv().await {
        if event.path == root.join("new.pdf") {
          return true;
        }
      }
      false
    })
    .await
    .unwrap_or(false);
    assert!(found, "polling watcher should report the new file");
  }
}
