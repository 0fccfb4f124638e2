//! Connection lifecycle and command buffering.

mod common;

use bridge_traits::TrackRef;
use common::{eventually, settle, EngineCall, FakeEngine, Stack};
use core_async::time::Duration;
use core_playback::{Command, CommandError, ConnectionState, ErrorSource, PlaybackConfig};
use core_runtime::events::{CommandEvent, ConnectionEvent, CoreEvent};

fn config() -> PlaybackConfig {
    PlaybackConfig::default()
}

#[tokio::test(start_paused = true)]
async fn test_commands_execute_in_order_when_connected() {
    let engine = FakeEngine::new();
    let stack = Stack::start(&engine, &config());
    stack
        .coordinator
        .wait_connected(Duration::from_secs(5))
        .await
        .unwrap();

    stack.coordinator.submit(Command::Play).await.unwrap();
    stack.coordinator.submit(Command::seek_to(12_000)).await.unwrap();
    stack.coordinator.submit(Command::Pause).await.unwrap();

    assert_eq!(
        engine.calls(),
        vec![
            EngineCall::Play,
            EngineCall::SeekTo {
                index: None,
                position_ms: 12_000
            },
            EngineCall::Pause,
        ]
    );
    stack.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_pending_commands_replay_in_submission_order() {
    let engine = FakeEngine::failing(usize::MAX);
    let stack = Stack::start(&engine, &config());
    eventually(|| stack.coordinator.connection_state() == ConnectionState::Failed).await;

    stack.coordinator.submit(Command::Play).await.unwrap();
    stack.coordinator.submit(Command::seek_to(5_000)).await.unwrap();
    stack.coordinator.submit(Command::Pause).await.unwrap();
    assert_eq!(stack.coordinator.pending_count().await, 3);
    assert!(engine.calls().is_empty());

    engine.set_fail_connects(0);
    stack
        .coordinator
        .wait_connected(Duration::from_secs(60))
        .await
        .unwrap();
    assert_eq!(stack.coordinator.pending_count().await, 0);

    assert_eq!(
        engine.calls(),
        vec![
            EngineCall::Play,
            EngineCall::SeekTo {
                index: None,
                position_ms: 5_000
            },
            EngineCall::Pause,
        ]
    );
    stack.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_full_buffer_evicts_oldest() {
    let engine = FakeEngine::failing(usize::MAX);
    let config = PlaybackConfig {
        pending_command_capacity: 2,
        ..config()
    };
    let stack = Stack::start(&engine, &config);
    let mut events = stack.bus.subscribe();
    eventually(|| stack.coordinator.connection_state() == ConnectionState::Failed).await;

    stack.coordinator.submit(Command::Play).await.unwrap();
    stack.coordinator.submit(Command::SkipNext).await.unwrap();
    stack.coordinator.submit(Command::Pause).await.unwrap();
    assert_eq!(stack.coordinator.pending_count().await, 2);

    let mut evicted = None;
    while let Ok(event) = events.try_recv() {
        if let CoreEvent::Command(CommandEvent::Evicted { command, capacity }) = event {
            evicted = Some((command, capacity));
        }
    }
    assert_eq!(evicted, Some(("Play".to_string(), 2)));

    engine.set_fail_connects(0);
    stack
        .coordinator
        .wait_connected(Duration::from_secs(60))
        .await
        .unwrap();
    assert_eq!(stack.coordinator.pending_count().await, 0);
    assert_eq!(engine.calls(), vec![EngineCall::SkipNext, EngineCall::Pause]);
    stack.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_backoff_doubles() {
    let engine = FakeEngine::failing(3);
    let stack = Stack::start(&engine, &config());
    stack
        .coordinator
        .wait_connected(Duration::from_secs(60))
        .await
        .unwrap();

    let times = engine.connect_times();
    assert_eq!(times.len(), 4);
    let gaps: Vec<u128> = times
        .windows(2)
        .map(|w| w[1].duration_since(w[0]).as_millis())
        .collect();
    assert_eq!(gaps, vec![500, 1_000, 2_000]);
    stack.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_connection_loss_reconnects_and_surfaces_error() {
    let engine = FakeEngine::new();
    let stack = Stack::start(&engine, &config());
    let mut events = stack.bus.subscribe();
    stack
        .coordinator
        .wait_connected(Duration::from_secs(5))
        .await
        .unwrap();

    engine.disconnect("engine process died");
    eventually(|| stack.coordinator.connection_state() != ConnectionState::Connected).await;
    eventually(|| {
        stack
            .view
            .current()
            .last_error
            .map(|e| e.source == ErrorSource::Connection)
            .unwrap_or(false)
    })
    .await;

    stack
        .coordinator
        .wait_connected(Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(engine.connects(), 2);

    let mut lost = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, CoreEvent::Connection(ConnectionEvent::Lost { .. })) {
            lost = true;
        }
    }
    assert!(lost);
    stack.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_rejected_command_sets_last_error() {
    let engine = FakeEngine::new();
    let stack = Stack::start(&engine, &config());
    stack
        .coordinator
        .wait_connected(Duration::from_secs(5))
        .await
        .unwrap();

    engine.reject_next();
    let err = stack.coordinator.submit(Command::seek_to(1_000)).await;
    assert!(matches!(err, Err(CommandError::Rejected { .. })));

    eventually(|| stack.view.current().last_error.is_some()).await;
    let error = stack.view.current().last_error.unwrap();
    assert_eq!(error.source, ErrorSource::Command);
    assert_eq!(error.code, "SeekTo");
    // A rejected command does not drop the connection.
    assert_eq!(stack.coordinator.connection_state(), ConnectionState::Connected);
    stack.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_play_track_immediate_requires_queued_track() {
    let engine = FakeEngine::new();
    let stack = Stack::start(&engine, &config());
    stack
        .coordinator
        .wait_connected(Duration::from_secs(5))
        .await
        .unwrap();

    let err = stack
        .coordinator
        .submit(Command::PlayTrackImmediate(TrackRef::new("rec", "missing")))
        .await;
    assert!(matches!(err, Err(CommandError::NotInQueue(_))));
    assert!(engine.calls().is_empty());
    stack.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_release_closes_coordinator() {
    let engine = FakeEngine::new();
    let stack = Stack::start(&engine, &config());
    stack
        .coordinator
        .wait_connected(Duration::from_secs(5))
        .await
        .unwrap();

    let coordinator = stack.coordinator.clone();
    stack.shutdown().await;
    settle().await;

    assert_eq!(coordinator.connection_state(), ConnectionState::Disconnected);
    assert!(matches!(
        coordinator.submit(Command::Play).await,
        Err(CommandError::Closed)
    ));
}
