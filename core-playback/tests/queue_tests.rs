//! Queue loading, URL resolution and index tracking.

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use bridge_traits::{
    BridgeError, EngineEvent, PlayableUrlResolver, Result as BridgeResult, TrackRef,
    TransitionReason,
};
use common::{eventually, tracks, EngineCall, FakeEngine, Stack, StaticCatalog, StaticResolver};
use core_async::time::Duration;
use core_playback::{PlaybackConfig, PlaybackError, QueueManager};
use core_runtime::events::{CoreEvent, QueueEvent};
use mockall::mock;
use mockall::predicate::function;

mock! {
    Resolver {}

    #[async_trait]
    impl PlayableUrlResolver for Resolver {
        async fn resolve_playable_url(&self, track: &TrackRef) -> BridgeResult<String>;
    }
}

struct Fixture {
    stack: Stack,
    queue: QueueManager,
    engine: FakeEngine,
}

async fn fixture(resolver: Arc<dyn PlayableUrlResolver>) -> Fixture {
    let engine = FakeEngine::new();
    let catalog = StaticCatalog::default().with("gd1977-05-08", tracks("gd1977-05-08", 4, 300_000));
    let (stack, mut subscribers) =
        Stack::start_with_subscribers(&engine, &PlaybackConfig::default(), 1);
    let queue = QueueManager::new(
        stack.coordinator.clone(),
        resolver,
        Arc::new(catalog),
        stack.bus.clone(),
    );
    queue.start(subscribers.remove(0));
    stack
        .coordinator
        .wait_connected(Duration::from_secs(5))
        .await
        .unwrap();
    Fixture {
        stack,
        queue,
        engine,
    }
}

#[tokio::test(start_paused = true)]
async fn test_unresolvable_items_are_skipped() {
    let mut resolver = MockResolver::new();
    resolver
        .expect_resolve_playable_url()
        .with(function(|t: &TrackRef| t.track_id == "t1"))
        .returning(|t| Err(BridgeError::NotFound(t.to_string())));
    resolver
        .expect_resolve_playable_url()
        .with(function(|t: &TrackRef| t.track_id != "t1"))
        .returning(|t| Ok(format!("file:///music/{}.flac", t.track_id)));

    let f = fixture(Arc::new(resolver)).await;
    let mut events = f.stack.bus.subscribe();
    f.queue
        .load_queue(tracks("gd1977-05-08", 3, 300_000), 1, 0, false)
        .await
        .unwrap();

    // t1 was requested as the start item; the next playable item starts.
    assert_eq!(
        f.engine.calls(),
        vec![EngineCall::SetQueue {
            media_ids: vec!["gd1977-05-08#t0".into(), "gd1977-05-08#t2".into()],
            start_index: 1,
            start_position_ms: 0,
        }]
    );
    let queue = f.queue.current();
    assert_eq!(queue.len(), 2);
    assert_eq!(queue.current_index, Some(1));
    assert_eq!(queue.items[0].source_url, "file:///music/t0.flac");

    let mut skipped = None;
    while let Ok(event) = events.try_recv() {
        if let CoreEvent::Queue(QueueEvent::ItemsSkipped { count }) = event {
            skipped = Some(count);
        }
    }
    assert_eq!(skipped, Some(1));
    f.stack.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_empty_collection_leaves_engine_untouched() {
    let f = fixture(Arc::new(StaticResolver::failing_for(&["t0", "t1"]))).await;
    let mut events = f.stack.bus.subscribe();

    f.queue
        .load_queue(tracks("gd1977-05-08", 2, 300_000), 0, 0, true)
        .await
        .unwrap();

    assert!(f.engine.calls().is_empty());
    assert!(f.queue.current().is_empty());
    let mut empty = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, CoreEvent::Queue(QueueEvent::EmptyCollection { .. })) {
            empty = true;
        }
    }
    assert!(empty);
    f.stack.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_play_track_in_queue_seeks_without_reload() {
    let f = fixture(Arc::new(StaticResolver::default())).await;
    f.queue
        .load_queue(tracks("gd1977-05-08", 4, 300_000), 0, 0, false)
        .await
        .unwrap();
    f.engine.clear_calls();

    f.queue
        .play_track(&TrackRef::new("gd1977-05-08", "t2"))
        .await
        .unwrap();

    assert_eq!(
        f.engine.calls(),
        vec![
            EngineCall::SeekTo {
                index: Some(2),
                position_ms: 0
            },
            EngineCall::Play,
        ]
    );
    eventually(|| f.queue.current().current_index == Some(2)).await;
    f.stack.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_play_track_outside_queue_loads_recording() {
    let f = fixture(Arc::new(StaticResolver::default())).await;

    f.queue
        .play_track(&TrackRef::new("gd1977-05-08", "t3"))
        .await
        .unwrap();

    let calls = f.engine.calls();
    assert_eq!(calls.len(), 2);
    assert!(matches!(
        &calls[0],
        EngineCall::SetQueue { media_ids, start_index: 3, .. } if media_ids.len() == 4
    ));
    assert_eq!(calls[1], EngineCall::Play);
    eventually(|| f.queue.current().current_index == Some(3)).await;

    let err = f
        .queue
        .play_track(&TrackRef::new("gd1977-05-08", "t9"))
        .await;
    assert!(matches!(err, Err(PlaybackError::TrackNotInRecording(_))));
    f.stack.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_skip_next_moves_index_without_playing() {
    let f = fixture(Arc::new(StaticResolver::default())).await;
    f.queue
        .load_queue(tracks("gd1977-05-08", 3, 300_000), 0, 0, false)
        .await
        .unwrap();
    assert_eq!(f.queue.current().current_index, Some(0));

    f.queue.skip_next().await.unwrap();

    eventually(|| f.queue.current().current_index == Some(1)).await;
    assert!(!f.stack.view.current().is_playing);
    f.stack.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_engine_transitions_update_index_with_clamping() {
    let f = fixture(Arc::new(StaticResolver::default())).await;
    f.queue
        .load_queue(tracks("gd1977-05-08", 3, 300_000), 0, 0, true)
        .await
        .unwrap();

    f.engine.emit(EngineEvent::ItemTransition {
        media_id: Some("gd1977-05-08#t2".into()),
        title: None,
        index: 2,
        duration_ms: Some(300_000),
        reason: TransitionReason::Auto,
    });
    eventually(|| f.queue.current().current_index == Some(2)).await;

    // Out-of-range index for an unknown item clamps to the last entry.
    f.engine.emit(EngineEvent::ItemTransition {
        media_id: None,
        title: None,
        index: 42,
        duration_ms: None,
        reason: TransitionReason::Auto,
    });
    f.engine.emit(EngineEvent::ItemTransition {
        media_id: Some("gd1977-05-08#t0".into()),
        title: None,
        index: 0,
        duration_ms: None,
        reason: TransitionReason::Seek,
    });
    eventually(|| f.queue.current().current_index == Some(0)).await;
    f.stack.shutdown().await;
}
