//! Integration tests for core-async on the Tokio runtime.

use core_async::{sync, task, time, Backoff, PeriodicTimer};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[tokio::test]
async fn test_task_spawn() {
    let handle = task::spawn(async { 42 });
    assert_eq!(handle.await.unwrap(), 42);
}

#[tokio::test]
async fn test_timeout_failure() {
    let result = time::timeout(time::Duration::from_millis(10), async {
        time::sleep(time::Duration::from_millis(100)).await;
        42
    })
    .await;

    assert!(result.is_err());
}

#[tokio::test]
async fn test_mpsc_preserves_order() {
    let (tx, mut rx) = sync::mpsc::unbounded_channel();
    for i in 0..10 {
        tx.send(i).unwrap();
    }
    drop(tx);

    let mut received = Vec::new();
    while let Some(v) = rx.recv().await {
        received.push(v);
    }
    assert_eq!(received, (0..10).collect::<Vec<_>>());
}

#[tokio::test(start_paused = true)]
async fn test_timer_cancelled_by_token_owner() {
    let ticks = Arc::new(AtomicUsize::new(0));
    let token = sync::CancellationToken::new();

    let mut timer = PeriodicTimer::new("integration");
    let counter = Arc::clone(&ticks);
    timer.start(time::Duration::from_millis(250), move || {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });

    let waiter = token.clone();
    let stopper = task::spawn(async move {
        waiter.cancelled().await;
        timer.stop();
        timer
    });

    time::sleep(time::Duration::from_millis(600)).await;
    token.cancel();
    let timer = stopper.await.unwrap();
    time::sleep(time::Duration::from_secs(2)).await;

    assert_eq!(ticks.load(Ordering::SeqCst), 2);
    assert!(!timer.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_backoff_drives_retry_loop() {
    let mut backoff = Backoff::new(time::Duration::from_millis(100), time::Duration::from_millis(400));
    let start = time::Instant::now();
    for _ in 0..4 {
        time::sleep(backoff.next_delay()).await;
    }
    // 100 + 200 + 400 + 400
    assert_eq!(start.elapsed(), time::Duration::from_millis(1100));
}
