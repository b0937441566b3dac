#[cfg(test)]
mod tests {
  use std::{
    io::Write,
    path::Path,
    sync::{
      Arc,
      atomic::{AtomicBool, Ordering},
    },
    time::Duration,
  };

  use pretty_assertions::assert_eq;
  use tokio::task::JoinHandle;
  use tokio_util::sync::CancellationToken;

  use crate::{
    actor::{__tests__::helpers::*, pipeline::StatsSnapshot},
    config::Config,
    daemon::{Daemon, DaemonError},
    state::{SNAPSHOT_FILE, Snapshot, epoch_now},
  };

  struct Running {
    cancel: CancellationToken,
    task: JoinHandle<Result<StatsSnapshot, DaemonError>>,
  }

  impl Running {
    async fn stop(self) -> StatsSnapshot {
      self.cancel.cancel();
      self.task.await.expect("daemon task").expect("clean shutdown")
    }
  }

  /// Start the daemon and wait until the startup snapshot is on disk.
  async fn start(ctx: &TestContext, config: Config) -> Running {
    let snapshot = ctx.state.path().join(SNAPSHOT_FILE);
    let started_at = epoch_now();

    let cancel = CancellationToken::new();
    let task = tokio::spawn(Daemon::new(config).run(cancel.clone()));

    assert!(
      wait_until(Duration::from_secs(5), || saved_since(&snapshot, started_at)).await,
      "daemon never saved its startup snapshot"
    );
    // let the polling watcher take its baseline
    tokio::time::sleep(Duration::from_millis(300)).await;
    Running { cancel, task }
  }

  fn saved_since(path: &Path, since: f64) -> bool {
    std::fs::read(path)
      .ok()
      .and_then(|bytes| serde_json::from_slice::<Snapshot>(&bytes).ok())
      .is_some_and(|snapshot| snapshot.timestamp >= since)
  }

  #[tokio::test(flavor = "multi_thread")]
  async fn test_only_new_file_is_copied_once() {
    let ctx = TestContext::new();
    ctx.write("a.pdf", b"already here before startup");
    let running = start(&ctx, ctx.config()).await;

    // b.pdf arrives in two chunks 200ms apart
    let b = ctx.src("b.pdf");
    let mut file = std::fs::File::create(&b).unwrap();
    file.write_all(&[1u8; 4096]).unwrap();
    file.flush().unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    file.write_all(&[2u8; 4096]).unwrap();
    file.sync_all().unwrap();
    drop(file);

    let dest_b = ctx.dst("b.pdf");
    assert!(wait_until(Duration::from_secs(15), || dest_b.exists()).await);
    // room for any stray duplicate pipeline
    tokio::time::sleep(Duration::from_millis(2500)).await;

    let stats = running.stop().await;
    assert_eq!(stats.copied, 1);
    assert_eq!(std::fs::metadata(&dest_b).unwrap().len(), 8192);
    assert!(!ctx.dst("a.pdf").exists(), "pre-existing file must never be copied");
  }

  #[tokio::test(flavor = "multi_thread")]
  async fn test_observer_never_sees_partial_destination() {
    const SIZE: usize = 16 * 1024 * 1024;

    let ctx = TestContext::new();
    let mut config = ctx.config();
    config.watch.debounce_secs = 0.3;
    config.stability.interval_secs = 0.2;
    let running = start(&ctx, config).await;

    let dest_root = ctx.dest_root();
    let done = Arc::new(AtomicBool::new(false));
    let observer = {
      let done = Arc::clone(&done);
      tokio::task::spawn_blocking(move || {
        let mut seen = Vec::new();
        while !done.load(Ordering::Relaxed) {
          if let Ok(entries) = std::fs::read_dir(&dest_root) {
            for entry in entries.flatten() {
              let name = entry.file_name().to_string_lossy().into_owned();
              if name.starts_with('.') {
                continue;
              }
              if let Ok(metadata) = entry.metadata() {
                seen.push((name, metadata.len()));
              }
            }
          }
          std::thread::sleep(Duration::from_millis(1));
        }
        seen
      })
    };

    ctx.write("large.bin", &vec![7u8; SIZE]);
    let dest = ctx.dst("large.bin");
    assert!(wait_until(Duration::from_secs(20), || dest.exists()).await);
    tokio::time::sleep(Duration::from_millis(200)).await;
    done.store(true, Ordering::Relaxed);

    let seen = observer.await.unwrap();
    running.stop().await;

    assert!(!seen.is_empty());
    for (name, len) in seen {
      assert_eq!(name, "large.bin");
      assert_eq!(len, SIZE as u64, "observed a partial destination file");
    }
  }

  #[tokio::test(flavor = "multi_thread")]
  async fn test_restart_does_not_recopy_but_picks_up_offline_changes() {
    let ctx = TestContext::new();

    // first run copies b.pdf
    let running = start(&ctx, ctx.config()).await;
    ctx.write("b.pdf", b"first version");
    let dest_b = ctx.dst("b.pdf");
    assert!(wait_until(Duration::from_secs(15), || dest_b.exists()).await);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(running.stop().await.copied, 1);

    // second run with the same state: nothing new, nothing re-copied
    std::fs::remove_file(&dest_b).unwrap();
    let running = start(&ctx, ctx.config()).await;
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(running.stop().await.copied, 0);
    assert!(!dest_b.exists());

    // changed while the daemon was down: copied on the next start
    ctx.write("b.pdf", b"second, longer version");
    let running = start(&ctx, ctx.config()).await;
    assert!(wait_until(Duration::from_secs(15), || dest_b.exists()).await);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(running.stop().await.copied, 1);
    assert_eq!(std::fs::read(&dest_b).unwrap(), b"second, longer version");
  }

  #[tokio::test]
  async fn test_missing_source_is_a_configuration_error() {
    let ctx = TestContext::new();
    let mut config = ctx.config();
    config.sources = vec![ctx.source_root().join("does-not-exist")];

    let err = Daemon::new(config)
      .run(CancellationToken::new())
      .await
      .expect_err("startup must fail");
    assert!(matches!(err, DaemonError::Configuration(_)));
    assert_eq!(err.exit_code(), 2);
  }
}
