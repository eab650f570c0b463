//! Core accounting scenarios: happy paths, dedup, skips, per-object errors.

use std::sync::Arc;

use ferry_adapter::SimAdapter;
use ferry_progress::TallyMeter;
use ferry_types::{Oid, TransferError};

use super::helpers::*;

#[tokio::test]
async fn test_happy_batch_download() {
    init_tracing();
    let client = ScriptClient::new();
    let basic = Arc::new(SimAdapter::basic());
    let meter = Arc::new(TallyMeter::new());
    let queue = download_queue(batch_config(), &client, &basic, &meter);

    let watcher = spawn_drain(queue.watch());

    queue.add(t("a", 10)).await;
    queue.add(t("b", 20)).await;
    queue.add(t("c", 30)).await;
    queue.wait().await;

    let mut seen = watcher.await.unwrap();
    seen.sort();
    assert_eq!(seen, vec![Oid::from("a"), Oid::from("b"), Oid::from("c")]);

    assert!(queue.errors().is_empty());
    assert_eq!(client.batch_sizes(), vec![3]);
    assert_eq!(basic.submissions().len(), 3);

    assert!(meter.started());
    assert!(meter.finished());
    assert_eq!(meter.files_added(), 3);
    assert_eq!(meter.transfers_finished(), 3);
    assert_eq!(meter.bytes_transferred(), 60);
}

#[tokio::test]
async fn test_happy_batch_upload() {
    init_tracing();
    let client = ScriptClient::new();
    let basic = Arc::new(SimAdapter::basic());
    let meter = Arc::new(TallyMeter::new());
    let queue = crate::TransferQueue::new(
        ferry_types::Direction::Upload,
        batch_config(),
        Arc::clone(&client) as Arc<dyn ferry_api::ObjectClient>,
        registry_of(&[&basic]),
        Arc::clone(&meter) as Arc<dyn ferry_progress::ProgressMeter>,
        None,
    );

    let watcher = spawn_drain(queue.watch());
    queue.add(t("a", 5)).await;
    queue.wait().await;

    assert_eq!(watcher.await.unwrap(), vec![Oid::from("a")]);
    assert!(queue.errors().is_empty());
    assert_eq!(basic.submissions().len(), 1);
}

#[tokio::test]
async fn test_duplicate_add_is_single_transfer() {
    init_tracing();
    let client = ScriptClient::new();
    let basic = Arc::new(SimAdapter::basic());
    let meter = Arc::new(TallyMeter::new());
    let queue = download_queue(batch_config(), &client, &basic, &meter);

    let watcher = spawn_drain(queue.watch());

    queue.add(t("a", 10)).await;
    queue.add(t("a", 10)).await;
    queue.wait().await;

    // One batch entry, one adapter submission, one notification.
    assert_eq!(client.batch_sizes(), vec![1]);
    assert_eq!(basic.submissions(), vec![Oid::from("a")]);
    assert_eq!(watcher.await.unwrap(), vec![Oid::from("a")]);
    assert!(queue.errors().is_empty());
}

#[tokio::test]
async fn test_already_satisfied_object_skipped() {
    init_tracing();
    let client = ScriptClient::new();
    client.mark_satisfied("c");
    let basic = Arc::new(SimAdapter::basic());
    let meter = Arc::new(TallyMeter::new());
    let queue = download_queue(batch_config(), &client, &basic, &meter);

    let watcher = spawn_drain(queue.watch());

    queue.add(t("a", 10)).await;
    queue.add(t("c", 30)).await;
    queue.wait().await;

    // No submission and no notification for c; its bytes are skipped.
    assert_eq!(basic.submissions(), vec![Oid::from("a")]);
    assert_eq!(watcher.await.unwrap(), vec![Oid::from("a")]);
    assert!(queue.errors().is_empty());
    assert_eq!(meter.skipped_bytes(), 30);
}

#[tokio::test]
async fn test_per_object_error_reported_and_skipped() {
    init_tracing();
    let client = ScriptClient::new();
    client.reject_object("b", 410, "expired");
    let basic = Arc::new(SimAdapter::basic());
    let meter = Arc::new(TallyMeter::new());
    let queue = download_queue(batch_config(), &client, &basic, &meter);

    let watcher = spawn_drain(queue.watch());

    queue.add(t("a", 10)).await;
    queue.add(t("b", 20)).await;
    queue.wait().await;

    assert_eq!(basic.submissions(), vec![Oid::from("a")]);
    assert_eq!(watcher.await.unwrap(), vec![Oid::from("a")]);
    assert_eq!(meter.skipped_bytes(), 20);

    let errors = queue.errors();
    assert_eq!(errors.len(), 1);
    match &errors[0] {
        TransferError::Object { oid, code, message } => {
            assert_eq!(oid, &Oid::from("b"));
            assert_eq!(*code, 410);
            assert_eq!(message, "expired");
        }
        other => panic!("expected per-object error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_empty_queue_waits_cleanly() {
    init_tracing();
    let client = ScriptClient::new();
    let basic = Arc::new(SimAdapter::basic());
    let meter = Arc::new(TallyMeter::new());
    let queue = download_queue(batch_config(), &client, &basic, &meter);

    queue.wait().await;

    assert!(queue.errors().is_empty());
    assert!(client.batch_sizes().is_empty(), "no batch call for no work");
    assert!(meter.finished());
}

#[tokio::test]
async fn test_wait_is_idempotent() {
    init_tracing();
    let client = ScriptClient::new();
    let basic = Arc::new(SimAdapter::basic());
    let meter = Arc::new(TallyMeter::new());
    let queue = download_queue(batch_config(), &client, &basic, &meter);

    queue.add(t("a", 10)).await;
    queue.wait().await;
    queue.wait().await;

    assert!(queue.errors().is_empty());
    assert_eq!(basic.submissions().len(), 1);
}

#[tokio::test]
async fn test_add_after_wait_is_dropped() {
    init_tracing();
    let client = ScriptClient::new();
    let basic = Arc::new(SimAdapter::basic());
    let meter = Arc::new(TallyMeter::new());
    let queue = download_queue(batch_config(), &client, &basic, &meter);

    queue.add(t("a", 10)).await;
    queue.wait().await;
    queue.add(t("late", 99)).await;

    assert_eq!(basic.submissions(), vec![Oid::from("a")]);
}

#[tokio::test]
async fn test_dry_run_moves_no_bytes() {
    init_tracing();
    let client = ScriptClient::new();
    let basic = Arc::new(SimAdapter::basic());
    let meter = Arc::new(TallyMeter::new());
    let config = ferry_config::TransferConfig {
        dry_run: true,
        ..batch_config()
    };
    let queue = download_queue(config, &client, &basic, &meter);

    let watcher = spawn_drain(queue.watch());
    queue.add(t("a", 10)).await;
    queue.add(t("b", 20)).await;
    queue.wait().await;

    // Negotiated and notified, but the adapter never saw a job.
    let mut seen = watcher.await.unwrap();
    seen.sort();
    assert_eq!(seen, vec![Oid::from("a"), Oid::from("b")]);
    assert!(basic.submissions().is_empty());
    assert!(queue.errors().is_empty());
    assert_eq!(meter.transfers_finished(), 2);
}

#[tokio::test]
async fn test_skip_forwards_to_meter() {
    init_tracing();
    let client = ScriptClient::new();
    let basic = Arc::new(SimAdapter::basic());
    let meter = Arc::new(TallyMeter::new());
    let queue = download_queue(batch_config(), &client, &basic, &meter);

    queue.skip(123);
    queue.wait().await;

    assert_eq!(meter.skipped_bytes(), 123);
}
