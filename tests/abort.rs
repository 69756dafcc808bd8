//! Abort semantics: cleanup, idempotence, and event emission.

mod common;

use common::{test_content, MockAdapter};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use turbodownload::{DownloadConfig, DownloadEvent, DownloadSession, PlanStore};

fn config_for(adapter: Arc<MockAdapter>, dest: &std::path::Path) -> DownloadConfig {
    DownloadConfig::new("http://test.invalid/file.bin", dest).with_adapter(adapter)
}

#[tokio::test]
async fn test_abort_without_save_removes_manifest_and_destination() {
    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("file.bin");
    let adapter = Arc::new(MockAdapter::new(test_content(102_400)).io_chunk(512));

    let config = config_for(adapter, &dest)
        .with_chunk_size(4096)
        .with_concurrency(8);
    let mut session = DownloadSession::new(config).unwrap();

    let handle = session.abort_handle();
    session.on_progress(move |downloaded, _total, _plan| {
        if downloaded >= 16_000 {
            handle.abort(false);
        }
    });

    session.download().await.unwrap();

    assert!(!dest.exists(), "destination must be removed");
    assert!(
        !PlanStore::for_destination(&dest).manifest_path().exists(),
        "manifest must be removed"
    );
}

#[tokio::test]
async fn test_abort_emits_aborted_exactly_once() {
    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("file.bin");
    let adapter = Arc::new(MockAdapter::new(test_content(65_536)).io_chunk(512));

    let config = config_for(adapter, &dest).with_chunk_size(4096);
    let mut session = DownloadSession::new(config).unwrap();

    let aborted = Arc::new(AtomicUsize::new(0));
    {
        let aborted = Arc::clone(&aborted);
        session.subscribe(move |event| {
            if matches!(event, DownloadEvent::Aborted) {
                aborted.fetch_add(1, Ordering::SeqCst);
            }
        });
    }

    let handle = session.abort_handle();
    session.on_progress(move |downloaded, _total, _plan| {
        if downloaded >= 8_000 {
            // Repeated aborts must collapse into one.
            handle.abort(false);
            handle.abort(true);
        }
    });

    session.download().await.unwrap();
    assert_eq!(aborted.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_abort_before_start_does_not_arm_the_latch() {
    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("file.bin");
    let content = test_content(8192);
    let adapter = Arc::new(MockAdapter::new(content.clone()));

    let session = DownloadSession::new(config_for(adapter, &dest)).unwrap();
    session.abort(false);

    // The pre-start abort is a no-op; the download runs to completion.
    session.download().await.unwrap();
    assert_eq!(std::fs::read(&dest).unwrap(), content);
}

#[tokio::test]
async fn test_abort_resolves_ok_without_terminal_error() {
    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("file.bin");
    let adapter = Arc::new(MockAdapter::new(test_content(102_400)).io_chunk(512));

    let config = config_for(adapter, &dest)
        .with_chunk_size(4096)
        .with_concurrency(4);
    let mut session = DownloadSession::new(config).unwrap();

    let handle = session.abort_handle();
    session.on_progress(move |downloaded, _total, _plan| {
        if downloaded >= 4096 {
            handle.abort(true);
        }
    });

    let result = session.download().await;
    assert!(result.is_ok(), "clean abort must not reject: {result:?}");
}
