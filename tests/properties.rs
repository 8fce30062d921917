//! Behavioural properties of tracking, waiting and guarding.

#![cfg(feature = "tokio")]

use std::collections::HashSet;
use std::time::Duration;

use futures::channel::oneshot;
use tracked_async::{
    render_arg, Error, Instrumented, Registry, Resolution, StepGuard, TrackedOperation,
};

/// A collaborator with one slow operation that can fail.
struct Storage;

impl Storage {
    async fn load(&self, key: u32, delay_ms: u64) -> Result<u32, String> {
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        if key % 3 == 0 {
            Err(format!("no key {key}"))
        } else {
            Ok(key * 10)
        }
    }
}

fn load(storage: &Instrumented<Storage>, key: u32, delay_ms: u64) -> TrackedOperation<Result<u32, String>> {
    let target = storage.target_arc();
    let max = storage.registry().config().max_arg_len;
    storage.track(
        "load",
        vec![render_arg(&key, max), render_arg(&delay_ms, max)],
        async move { target.load(key, delay_ms).await },
    )
}

#[tokio::test(start_paused = true)]
async fn test_conservation_after_success_and_failure() {
    let registry = Registry::new();
    let storage = registry.wrap(Storage);

    let handles: Vec<_> = (1..=20u32)
        .map(|key| tokio::spawn(load(&storage, key, u64::from(key % 7))))
        .collect();
    assert_eq!(registry.pending_count(), 20);

    let mut failures = 0;
    for handle in handles {
        if handle.await.unwrap().is_err() {
            failures += 1;
        }
    }

    assert_eq!(failures, 6);
    assert_eq!(registry.pending_count(), 0);
    assert!(registry.snapshot().is_empty());
}

#[tokio::test]
async fn test_chaining_creates_one_entry_per_continuation() {
    let registry = Registry::new();
    let storage = registry.wrap(Storage);
    let (release, gate) = oneshot::channel::<u32>();

    let root = load(&storage, 1, 1);
    let mut ids = vec![root.id()];
    let first = root.map(|r| r.unwrap_or_default() + 1);
    ids.push(first.id());
    let second = first.map(|n| n * 2);
    ids.push(second.id());
    let last = second.then(move |n| Resolution::forward(async move { n + gate.await.unwrap_or(0) }));
    ids.push(last.id());
    let last_id = last.id();

    assert_eq!(ids.iter().collect::<HashSet<_>>().len(), 4);
    assert_eq!(registry.pending_count(), 4);

    let handle = tokio::spawn(last);
    while registry.pending_count() > 1 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    // Only the last continuation remains: its administrative future has
    // settled but the nested result has not.
    let report = registry.snapshot();
    assert_eq!(report.entries()[0].id, last_id);
    assert!(report.entries()[0].description.starts_with("Storage.load(1, 1).then("));

    release.send(100).unwrap();
    assert_eq!(handle.await.unwrap(), 122);
    assert!(registry.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_wait_on_empty_registry_is_immediate() {
    let registry = Registry::new();
    let started = tokio::time::Instant::now();

    registry.wait_for_quiescence_for(Duration::from_millis(50)).await.unwrap();
    assert_eq!(started.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_wait_resolves_when_work_settles() {
    let registry = Registry::new();
    let storage = registry.wrap(Storage);
    let started = tokio::time::Instant::now();

    tokio::spawn(load(&storage, 1, 10));
    registry.wait_for_quiescence_for(Duration::from_millis(50)).await.unwrap();

    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(10));
    assert!(elapsed < Duration::from_millis(50));
}

#[tokio::test(start_paused = true)]
async fn test_wait_times_out_naming_the_operation() {
    let registry = Registry::new();
    let storage = registry.wrap(Storage);
    let started = tokio::time::Instant::now();

    let never = storage.track("hang", vec![], futures::future::pending::<()>());
    tokio::spawn(never);

    let err = registry
        .wait_for_quiescence_for(Duration::from_millis(50))
        .await
        .unwrap_err();

    assert!(started.elapsed() >= Duration::from_millis(50));
    assert!(matches!(err, Error::QuiescenceTimeout { .. }));
    let message = err.to_string();
    assert!(message.starts_with("Gave up waiting after 50ms for:"), "{message}");
    assert!(message.contains("Storage.hang()"), "{message}");
    assert!(message.contains("properties.rs"), "{message}");
}

#[tokio::test]
async fn test_guard_catches_unawaited_work() {
    let registry = Registry::new();
    let storage = registry.wrap(Storage);
    let guard = StepGuard::new(&registry);

    let step = guard.guard(|storage: Instrumented<Storage>| async move {
        tokio::spawn(load(&storage, 2, 5));
    });

    let err = step(storage.clone()).await.unwrap_err();
    assert_eq!(err.report().descriptions(), vec!["Storage.load(2, 5)"]);

    registry.wait_for_quiescence().await.unwrap();
    assert!(step(storage).await.is_err(), "a new leak each time");
    registry.wait_for_quiescence().await.unwrap();
}

#[tokio::test]
async fn test_nested_wrappers_settle_once() {
    let registry = Registry::new();
    let storage = registry.wrap(Storage);

    let inner = load(&storage, 4, 2);
    let call_site = tracked_async::CallSite::here("Wrapper", "outer", vec![]);
    let outer = TrackedOperation::from_resolution(&registry, call_site, inner.into());
    assert_eq!(registry.pending_count(), 2);

    let first = tokio::spawn({
        let registry = registry.clone();
        async move { registry.wait_for_quiescence().await }
    });
    let second = tokio::spawn({
        let registry = registry.clone();
        async move { registry.wait_for_quiescence().await }
    });

    assert_eq!(outer.await, Ok(40));
    assert_eq!(registry.pending_count(), 0);
    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_panicking_operation_does_not_block_waiters() {
    let registry = Registry::new();
    let storage = registry.wrap(Storage);

    let op = storage.track("explode", vec![], async {
        tokio::time::sleep(Duration::from_millis(1)).await;
        panic!("storage failure");
    });
    let handle = tokio::spawn(op);

    registry.wait_for_quiescence().await.unwrap();
    assert!(handle.await.unwrap_err().is_panic());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_settlement_across_threads() {
    let registry = Registry::new();
    let storage = registry.wrap(Storage);

    for key in 0..64u32 {
        let op = load(&storage, key, u64::from(key % 4));
        tokio::spawn(op.map(|r| r.is_ok()));
    }

    registry.wait_for_quiescence_for(Duration::from_secs(5)).await.unwrap();
    assert_eq!(registry.pending_count(), 0);
}

#[tokio::test]
async fn test_registries_are_independent() {
    let first = Registry::new();
    let second = Registry::new();
    let storage = first.wrap(Storage);

    let op = load(&storage, 1, 1);
    assert_eq!(first.pending_count(), 1);
    assert!(second.is_empty());
    assert!(second.assert_no_pending_operations().is_ok());

    op.await.unwrap();
}
