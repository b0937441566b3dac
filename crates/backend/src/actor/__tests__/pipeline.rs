#[cfg(test)]
mod tests {
  use std::{io::Read, sync::Arc, time::Duration};

  use pretty_assertions::assert_eq;

  use crate::{
    actor::{Pipeline, PipelineStats, __tests__::helpers::*, pool::CandidateRunner},
    domain::{
      candidate::{CandidateKind, Outcome, SkipReason},
      config::FilterConfig,
    },
    service::{filter::FileFilter, webhook::WebhookNotifier},
  };

  #[tokio::test]
  async fn test_copy_then_identical_rewrite_is_duplicate() {
    let ctx = TestContext::new();
    let (state, _task) = ctx.spawn_state();
    let (pipeline, stats) = build_pipeline(&state, fast_settings(), &FilterConfig::default());
    let router = ctx.router(false, false);

    let source = ctx.write("report.pdf", b"quarterly numbers");
    let outcome = pipeline.run(ctx.candidate(&router, &source, CandidateKind::File)).await;
    assert!(matches!(outcome, Outcome::Copied { bytes: 17, .. }), "{:?}", outcome);
    assert_eq!(std::fs::read(ctx.dst("report.pdf")).unwrap(), b"quarterly numbers");

    // same bytes, same destination
    ctx.write("report.pdf", b"quarterly numbers");
    let outcome = pipeline.run(ctx.candidate(&router, &source, CandidateKind::File)).await;
    assert_eq!(outcome, Outcome::Skipped(SkipReason::Duplicate));

    let totals = stats.snapshot();
    assert_eq!(totals.copied, 1);
    assert_eq!(totals.duplicates, 1);
  }

  #[tokio::test]
  async fn test_identical_content_at_other_destination_is_copied() {
    let ctx = TestContext::new();
    let (state, _task) = ctx.spawn_state();
    let (pipeline, _stats) = build_pipeline(&state, fast_settings(), &FilterConfig::default());
    let router = ctx.router(true, false);

    let first = ctx.write("left/scan.pdf", b"same bytes");
    let second = ctx.write("right/scan.pdf", b"same bytes");

    let a = pipeline.run(ctx.candidate(&router, &first, CandidateKind::File)).await;
    let b = pipeline.run(ctx.candidate(&router, &second, CandidateKind::File)).await;

    assert!(matches!(a, Outcome::Copied { .. }));
    assert!(matches!(b, Outcome::Copied { .. }));
    assert!(ctx.dst("left/scan.pdf").is_file());
    assert!(ctx.dst("right/scan.pdf").is_file());
  }

  #[tokio::test]
  async fn test_changed_content_is_copied_again() {
    let ctx = TestContext::new();
    let (state, _task) = ctx.spawn_state();
    let (pipeline, _stats) = build_pipeline(&state, fast_settings(), &FilterConfig::default());
    let router = ctx.router(false, false);

    let source = ctx.write("doc.txt", b"v1");
    pipeline.run(ctx.candidate(&router, &source, CandidateKind::File)).await;
    ctx.write("doc.txt", b"version two");
    let outcome = pipeline.run(ctx.candidate(&router, &source, CandidateKind::File)).await;

    assert!(matches!(outcome, Outcome::Copied { bytes: 11, .. }));
    assert_eq!(std::fs::read(ctx.dst("doc.txt")).unwrap(), b"version two");
  }

  #[tokio::test]
  async fn test_growing_file_times_out_without_copy() {
    let ctx = TestContext::new();
    let (state, _task) = ctx.spawn_state();
    let mut settings = fast_settings();
    settings.copy_timeout = Duration::from_millis(600);
    let (pipeline, stats) = build_pipeline(&state, settings, &FilterConfig::default());
    let router = ctx.router(false, false);

    let source = ctx.write("growing.bin", b"x");
    let writer_path = source.clone();
    let writer = tokio::spawn(async move {
      for i in 0..40u8 {
        let mut bytes = std::fs::read(&writer_path).unwrap();
        bytes.push(i);
        std::fs::write(&writer_path, bytes).unwrap();
        tokio::time::sleep(Duration::from_millis(25)).await;
      }
    });

    let outcome = pipeline.run(ctx.candidate(&router, &source, CandidateKind::File)).await;
    writer.abort();

    assert_eq!(outcome, Outcome::TimedOut);
    assert!(!ctx.dst("growing.bin").exists());
    assert_eq!(stats.snapshot().timed_out, 1);
    assert_eq!(state.cached_hash(&ctx.dst("growing.bin")).await.unwrap(), None);
  }

  #[tokio::test]
  async fn test_missing_source_is_vanished() {
    let ctx = TestContext::new();
    let (state, _task) = ctx.spawn_state();
    let (pipeline, _stats) = build_pipeline(&state, fast_settings(), &FilterConfig::default());
    let router = ctx.router(false, false);

    let outcome = pipeline
      .run(ctx.candidate(&router, &ctx.src("ghost.pdf"), CandidateKind::File))
      .await;
    assert_eq!(outcome, Outcome::Vanished);
  }

  #[tokio::test]
  async fn test_filters_skip_before_copy() {
    let ctx = TestContext::new();
    let (state, _task) = ctx.spawn_state();
    let filter = FilterConfig {
      exclude: vec!["*.tmp".to_string()],
      max_file_size_mb: 1,
      ..Default::default()
    };
    let (pipeline, stats) = build_pipeline(&state, fast_settings(), &filter);
    let router = ctx.router(false, false);

    let partial = ctx.write("upload.tmp", b"partial");
    let huge = ctx.write("huge.bin", &vec![0u8; 1024 * 1024 + 1]);

    assert_eq!(
      pipeline.run(ctx.candidate(&router, &partial, CandidateKind::File)).await,
      Outcome::Skipped(SkipReason::Filtered)
    );
    assert_eq!(
      pipeline.run(ctx.candidate(&router, &huge, CandidateKind::File)).await,
      Outcome::Skipped(SkipReason::TooLarge)
    );
    assert!(!ctx.dst("upload.tmp").exists());
    assert!(!ctx.dst("huge.bin").exists());
    assert_eq!(stats.snapshot().skipped, 2);
  }

  #[tokio::test]
  async fn test_dry_run_leaves_destination_and_cache_untouched() {
    let ctx = TestContext::new();
    let (state, _task) = ctx.spawn_state();
    let mut settings = fast_settings();
    settings.dry_run = true;
    let (pipeline, _stats) = build_pipeline(&state, settings, &FilterConfig::default());
    let router = ctx.router(false, false);

    let source = ctx.write("preview.pdf", b"content");
    let outcome = pipeline.run(ctx.candidate(&router, &source, CandidateKind::File)).await;

    assert_eq!(outcome, Outcome::Skipped(SkipReason::DryRun));
    assert!(!ctx.dst("preview.pdf").exists());
    assert_eq!(state.cached_hash(&ctx.dst("preview.pdf")).await.unwrap(), None);
  }

  #[tokio::test]
  async fn test_delete_source_after_copy() {
    let ctx = TestContext::new();
    let (state, _task) = ctx.spawn_state();
    let mut settings = fast_settings();
    settings.delete_source = true;
    let (pipeline, _stats) = build_pipeline(&state, settings, &FilterConfig::default());
    let router = ctx.router(false, false);

    let source = ctx.write("move-me.pdf", b"payload");
    let outcome = pipeline.run(ctx.candidate(&router, &source, CandidateKind::File)).await;

    assert!(matches!(outcome, Outcome::Copied { .. }));
    assert!(!source.exists());
    assert_eq!(std::fs::read(ctx.dst("move-me.pdf")).unwrap(), b"payload");
    assert_eq!(state.stats().await.unwrap().snapshot_entries, 0);
  }

  #[tokio::test]
  async fn test_compressed_copy_lands_as_gzip() {
    let ctx = TestContext::new();
    let (state, _task) = ctx.spawn_state();
    let mut settings = fast_settings();
    settings.compress = true;
    let (pipeline, _stats) = build_pipeline(&state, settings, &FilterConfig::default());
    let router = ctx.router(false, true);

    let source = ctx.write("notes.txt", b"compress me please");
    let outcome = pipeline.run(ctx.candidate(&router, &source, CandidateKind::File)).await;
    assert!(matches!(outcome, Outcome::Copied { .. }));

    let file = std::fs::File::open(ctx.dst("notes.txt.gz")).unwrap();
    let mut text = String::new();
    flate2::read::GzDecoder::new(file).read_to_string(&mut text).unwrap();
    assert_eq!(text, "compress me please");
  }

  #[tokio::test]
  async fn test_empty_directory_is_materialized() {
    let ctx = TestContext::new();
    let (state, _task) = ctx.spawn_state();
    let (pipeline, stats) = build_pipeline(&state, fast_settings(), &FilterConfig::default());
    let router = ctx.router(true, false);

    let dir = ctx.src("inbox/empty");
    std::fs::create_dir_all(&dir).unwrap();
    let outcome = pipeline.run(ctx.candidate(&router, &dir, CandidateKind::EmptyDir)).await;

    assert_eq!(outcome, Outcome::DirectoryCreated);
    assert!(ctx.dst("inbox/empty").is_dir());
    assert_eq!(stats.snapshot().directories, 1);
  }

  /// Local endpoint that answers one POST after `delay` and reports the body.
  async fn slow_endpoint(delay: Duration) -> (String, tokio::sync::oneshot::Receiver<String>) {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/hook", listener.local_addr().unwrap());
    let (tx, rx) = tokio::sync::oneshot::channel();

    tokio::spawn(async move {
      let (mut socket, _) = listener.accept().await.unwrap();
      let mut received = Vec::new();
      let mut buf = [0u8; 4096];
      while !String::from_utf8_lossy(&received).contains("file_copied") {
        let n = socket.read(&mut buf).await.unwrap();
        if n == 0 {
          break;
        }
        received.extend_from_slice(&buf[..n]);
      }
      tokio::time::sleep(delay).await;
      socket
        .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
        .await
        .unwrap();
      let _ = tx.send(String::from_utf8_lossy(&received).into_owned());
    });

    (url, rx)
  }

  #[tokio::test]
  async fn test_pending_webhook_is_drained_before_shutdown() {
    let ctx = TestContext::new();
    let (state, _task) = ctx.spawn_state();
    let (url, delivered) = slow_endpoint(Duration::from_millis(300)).await;

    let webhook = WebhookNotifier::new(url, Duration::from_secs(5)).unwrap();
    let filter = FileFilter::from_config(&FilterConfig::default()).unwrap();
    let pipeline = Pipeline::new(
      fast_settings(),
      filter,
      state.clone(),
      Some(webhook),
      Arc::new(PipelineStats::default()),
    );
    let router = ctx.router(false, false);

    let source = ctx.write("notify.pdf", b"tell someone");
    let outcome = pipeline.run(ctx.candidate(&router, &source, CandidateKind::File)).await;
    assert!(matches!(outcome, Outcome::Copied { .. }), "{:?}", outcome);

    assert!(pipeline.drain_notifications(Duration::from_secs(5)).await);
    let request = delivered.await.unwrap();
    assert!(request.contains("notify.pdf"), "{}", request);
  }

  #[tokio::test]
  async fn test_drain_without_notifications_returns_immediately() {
    let ctx = TestContext::new();
    let (state, _task) = ctx.spawn_state();
    let (pipeline, _stats) = build_pipeline(&state, fast_settings(), &FilterConfig::default());
    assert!(pipeline.drain_notifications(Duration::ZERO).await);
  }
}
