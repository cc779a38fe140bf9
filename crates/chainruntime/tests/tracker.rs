use chainruntime::CompletionTracker;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

#[tokio::test]
async fn quiescent_immediately_when_nothing_was_tracked() {
    let tracker = CompletionTracker::new();
    timeout(Duration::from_millis(100), tracker.quiescent())
        .await
        .expect("an untouched tracker is quiescent");
}

#[tokio::test]
async fn quiescent_resolves_when_count_returns_to_zero() {
    let tracker = Arc::new(CompletionTracker::new());
    for _ in 0..3 {
        tracker.track();
    }
    assert_eq!(tracker.pending(), 3);

    let settler = Arc::clone(&tracker);
    tokio::spawn(async move {
        for _ in 0..3 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            settler.settle();
        }
    });

    timeout(Duration::from_secs(2), tracker.quiescent())
        .await
        .expect("tracker should reach zero");
    assert_eq!(tracker.pending(), 0);
}

#[tokio::test]
async fn concurrent_settlers_do_not_miss_the_zero_crossing() {
    let tracker = Arc::new(CompletionTracker::new());
    let tasks = 64;
    for _ in 0..tasks {
        tracker.track();
    }

    let mut handles = Vec::new();
    for _ in 0..tasks {
        let tracker = Arc::clone(&tracker);
        handles.push(tokio::spawn(async move {
            tokio::task::yield_now().await;
            tracker.settle();
        }));
    }

    timeout(Duration::from_secs(2), tracker.quiescent())
        .await
        .expect("tracker should reach zero under contention");
    for handle in handles {
        handle.await.unwrap();
    }
}

#[tokio::test]
async fn does_not_resolve_while_deliveries_are_pending() {
    let tracker = CompletionTracker::new();
    tracker.track();
    assert!(
        timeout(Duration::from_millis(50), tracker.quiescent())
            .await
            .is_err(),
        "a pending delivery must hold the run open"
    );
    tracker.settle();
    timeout(Duration::from_millis(100), tracker.quiescent())
        .await
        .expect("settled tracker is quiescent");
}
