//! Shared fakes for core-playback integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bridge_traits::{
    BridgeError, ConnectionToken, EngineConnection, EngineConnector, EngineEvent,
    EngineEventSender, EngineQueueEntry, EngineSession, HistoryStore, ListeningSession,
    PlayableUrlResolver, PlaybackState, RecordingCatalog, RepeatMode, Result, SettingsStore,
    TrackCompletion, TrackInfo, TrackPlayRecord, TrackRef, TransitionReason,
    DiscontinuityReason,
};
use chrono::{DateTime, Utc};
use core_async::sync::{mpsc, oneshot};
use core_async::time::{Duration, Instant};
use core_playback::{
    CommandCoordinator, CoordinatorSettings, EventTracker, PlaybackConfig, SessionState,
    SessionStateView,
};
use core_runtime::events::EventBus;

// ============================================================================
// Engine
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    SetQueue {
        media_ids: Vec<String>,
        start_index: usize,
        start_position_ms: u64,
    },
    Play,
    Pause,
    Stop,
    SeekTo {
        index: Option<usize>,
        position_ms: u64,
    },
    SkipNext,
    SkipPrevious,
    SetRepeatMode(RepeatMode),
    SetShuffle(bool),
}

#[derive(Default)]
struct EngineModel {
    calls: Vec<EngineCall>,
    queue: Vec<EngineQueueEntry>,
    index: i64,
    position_ms: i64,
    alive: bool,
    reject_next: bool,
    fail_connects: usize,
    connects: usize,
    connect_times: Vec<Instant>,
    events: Option<EngineEventSender>,
    disconnect: Option<oneshot::Sender<String>>,
}

impl EngineModel {
    fn emit(&self, event: EngineEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }

    fn check(&mut self) -> Result<()> {
        if !self.alive {
            return Err(BridgeError::EngineDisconnected("engine gone".into()));
        }
        if self.reject_next {
            self.reject_next = false;
            return Err(BridgeError::OperationFailed("rejected".into()));
        }
        Ok(())
    }

    fn transition(&self, reason: TransitionReason) {
        let entry = self.queue.get(self.index.max(0) as usize);
        self.emit(EngineEvent::ItemTransition {
            media_id: entry.map(|e| e.media_id.clone()),
            title: entry.map(|e| e.title.clone()),
            index: self.index,
            duration_ms: entry.and_then(|e| e.duration_ms).map(|d| d as i64),
            reason,
        });
    }
}

/// Scripted in-process engine. Records every call and emits the callbacks a
/// real engine would.
#[derive(Clone)]
pub struct FakeEngine {
    model: Arc<Mutex<EngineModel>>,
}

impl Default for FakeEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::failing(0)
    }

    /// Engine whose first `n` connection attempts fail.
    pub fn failing(n: usize) -> Self {
        Self {
            model: Arc::new(Mutex::new(EngineModel {
                index: -1,
                fail_connects: n,
                ..Default::default()
            })),
        }
    }

    pub fn set_fail_connects(&self, n: usize) {
        self.model.lock().unwrap().fail_connects = n;
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.model.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.model.lock().unwrap().calls.clear();
    }

    pub fn connects(&self) -> usize {
        self.model.lock().unwrap().connects
    }

    pub fn connect_times(&self) -> Vec<Instant> {
        self.model.lock().unwrap().connect_times.clone()
    }

    pub fn set_position(&self, position_ms: i64) {
        self.model.lock().unwrap().position_ms = position_ms;
    }

    pub fn reject_next(&self) {
        self.model.lock().unwrap().reject_next = true;
    }

    pub fn emit(&self, event: EngineEvent) {
        self.model.lock().unwrap().emit(event);
    }

    /// Simulate the engine process going away.
    pub fn disconnect(&self, reason: &str) {
        let mut model = self.model.lock().unwrap();
        model.alive = false;
        if let Some(tx) = model.disconnect.take() {
            let _ = tx.send(reason.to_string());
        }
    }
}

#[async_trait]
impl EngineConnector for FakeEngine {
    async fn connect(
        &self,
        _token: &ConnectionToken,
        events: EngineEventSender,
    ) -> Result<EngineConnection> {
        let mut model = self.model.lock().unwrap();
        model.connect_times.push(Instant::now());
        if model.fail_connects > 0 {
            model.fail_connects -= 1;
            return Err(BridgeError::NotAvailable("engine service not bound".into()));
        }
        let (tx, rx) = oneshot::channel();
        model.connects += 1;
        model.alive = true;
        model.disconnect = Some(tx);
        model.events = Some(events);
        Ok(EngineConnection {
            session: Box::new(FakeSession {
                model: Arc::clone(&self.model),
            }),
            disconnected: rx,
        })
    }
}

struct FakeSession {
    model: Arc<Mutex<EngineModel>>,
}

impl EngineSession for FakeSession {
    fn set_queue(
        &mut self,
        entries: Vec<EngineQueueEntry>,
        start_index: usize,
        start_position_ms: u64,
    ) -> Result<()> {
        let mut m = self.model.lock().unwrap();
        m.check()?;
        m.calls.push(EngineCall::SetQueue {
            media_ids: entries.iter().map(|e| e.media_id.clone()).collect(),
            start_index,
            start_position_ms,
        });
        m.queue = entries;
        m.index = start_index as i64;
        m.position_ms = start_position_ms as i64;
        m.transition(TransitionReason::PlaylistChanged);
        m.emit(EngineEvent::PlaybackStateChanged(PlaybackState::Buffering));
        m.emit(EngineEvent::PlaybackStateChanged(PlaybackState::Ready));
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        let mut m = self.model.lock().unwrap();
        m.check()?;
        m.calls.push(EngineCall::Play);
        m.emit(EngineEvent::IsPlayingChanged(true));
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        let mut m = self.model.lock().unwrap();
        m.check()?;
        m.calls.push(EngineCall::Pause);
        m.emit(EngineEvent::IsPlayingChanged(false));
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let mut m = self.model.lock().unwrap();
        m.check()?;
        m.calls.push(EngineCall::Stop);
        m.emit(EngineEvent::IsPlayingChanged(false));
        m.emit(EngineEvent::PlaybackStateChanged(PlaybackState::Idle));
        Ok(())
    }

    fn seek_to(&mut self, index: Option<usize>, position_ms: u64) -> Result<()> {
        let mut m = self.model.lock().unwrap();
        m.check()?;
        m.calls.push(EngineCall::SeekTo { index, position_ms });
        if let Some(index) = index {
            if index as i64 != m.index {
                m.index = index as i64;
                m.transition(TransitionReason::Seek);
            }
        }
        let old = m.position_ms;
        m.position_ms = position_ms as i64;
        m.emit(EngineEvent::PositionDiscontinuity {
            old_ms: old,
            new_ms: position_ms as i64,
            reason: DiscontinuityReason::Seek,
        });
        Ok(())
    }

    fn skip_next(&mut self) -> Result<()> {
        let mut m = self.model.lock().unwrap();
        m.check()?;
        m.calls.push(EngineCall::SkipNext);
        if m.index + 1 < m.queue.len() as i64 {
            m.index += 1;
            m.position_ms = 0;
            m.transition(TransitionReason::Seek);
        }
        Ok(())
    }

    fn skip_previous(&mut self) -> Result<()> {
        let mut m = self.model.lock().unwrap();
        m.check()?;
        m.calls.push(EngineCall::SkipPrevious);
        if m.index > 0 {
            m.index -= 1;
            m.position_ms = 0;
            m.transition(TransitionReason::Seek);
        }
        Ok(())
    }

    fn set_repeat_mode(&mut self, mode: RepeatMode) -> Result<()> {
        let mut m = self.model.lock().unwrap();
        m.check()?;
        m.calls.push(EngineCall::SetRepeatMode(mode));
        Ok(())
    }

    fn set_shuffle(&mut self, enabled: bool) -> Result<()> {
        let mut m = self.model.lock().unwrap();
        m.check()?;
        m.calls.push(EngineCall::SetShuffle(enabled));
        Ok(())
    }

    fn current_index(&mut self) -> Result<i64> {
        let m = self.model.lock().unwrap();
        if !m.alive {
            return Err(BridgeError::EngineDisconnected("engine gone".into()));
        }
        Ok(m.index)
    }

    fn position_ms(&mut self) -> Result<i64> {
        let m = self.model.lock().unwrap();
        if !m.alive {
            return Err(BridgeError::EngineDisconnected("engine gone".into()));
        }
        Ok(m.position_ms)
    }

    fn duration_ms(&mut self) -> Result<Option<i64>> {
        let m = self.model.lock().unwrap();
        Ok(m
            .queue
            .get(m.index.max(0) as usize)
            .and_then(|e| e.duration_ms)
            .map(|d| d as i64))
    }
}

// ============================================================================
// Content bridges
// ============================================================================

/// Catalog backed by a fixed map.
#[derive(Default)]
pub struct StaticCatalog {
    recordings: HashMap<String, Vec<TrackInfo>>,
}

impl StaticCatalog {
    pub fn with(mut self, recording_id: &str, tracks: Vec<TrackInfo>) -> Self {
        self.recordings.insert(recording_id.to_string(), tracks);
        self
    }
}

#[async_trait]
impl RecordingCatalog for StaticCatalog {
    async fn tracks_for_recording(&self, recording_id: &str) -> Result<Vec<TrackInfo>> {
        self.recordings
            .get(recording_id)
            .cloned()
            .ok_or_else(|| BridgeError::NotFound(recording_id.to_string()))
    }
}

/// Resolver that streams everything except the listed track ids.
#[derive(Default)]
pub struct StaticResolver {
    unresolvable: HashSet<String>,
}

impl StaticResolver {
    pub fn failing_for(ids: &[&str]) -> Self {
        Self {
            unresolvable: ids.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[async_trait]
impl PlayableUrlResolver for StaticResolver {
    async fn resolve_playable_url(&self, track: &TrackRef) -> Result<String> {
        if self.unresolvable.contains(&track.track_id) {
            return Err(BridgeError::NotFound(track.to_string()));
        }
        Ok(format!(
            "https://stream.example.org/{}/{}.mp3",
            track.recording_id, track.track_id
        ))
    }
}

pub fn tracks(recording_id: &str, n: usize, duration_ms: u64) -> Vec<TrackInfo> {
    (0..n)
        .map(|i| {
            TrackInfo::new(TrackRef::new(recording_id, format!("t{i}")), format!("Track {i}"))
                .with_duration_ms(duration_ms)
        })
        .collect()
}

// ============================================================================
// Storage bridges
// ============================================================================

#[derive(Default)]
pub struct MemoryHistory {
    pub sessions: Mutex<Vec<ListeningSession>>,
    pub plays: Mutex<Vec<TrackPlayRecord>>,
}

impl MemoryHistory {
    pub fn with_play(record: TrackPlayRecord) -> Self {
        let history = Self::default();
        history.plays.lock().unwrap().push(record);
        history
    }

    pub fn plays(&self) -> Vec<TrackPlayRecord> {
        self.plays.lock().unwrap().clone()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistory {
    async fn start_session(&self, session: &ListeningSession) -> Result<()> {
        self.sessions.lock().unwrap().push(session.clone());
        Ok(())
    }

    async fn complete_session(&self, session_id: &str, ended_at: DateTime<Utc>) -> Result<()> {
        for session in self.sessions.lock().unwrap().iter_mut() {
            if session.session_id == session_id {
                session.ended_at = Some(ended_at);
            }
        }
        Ok(())
    }

    async fn insert_track_play(&self, record: &TrackPlayRecord) -> Result<i64> {
        let mut plays = self.plays.lock().unwrap();
        let id = plays.len() as i64 + 1;
        let mut record = record.clone();
        record.id = Some(id);
        plays.push(record);
        Ok(id)
    }

    async fn update_track_play_progress(
        &self,
        id: i64,
        final_position_ms: u64,
        played_duration_ms: u64,
    ) -> Result<()> {
        let mut plays = self.plays.lock().unwrap();
        let row = plays
            .iter_mut()
            .find(|p| p.id == Some(id))
            .ok_or_else(|| BridgeError::NotFound(id.to_string()))?;
        row.final_position_ms = Some(final_position_ms);
        row.played_duration_ms = Some(played_duration_ms);
        Ok(())
    }

    async fn update_track_play_completion(
        &self,
        id: i64,
        completion: &TrackCompletion,
    ) -> Result<()> {
        let mut plays = self.plays.lock().unwrap();
        let row = plays
            .iter_mut()
            .find(|p| p.id == Some(id))
            .ok_or_else(|| BridgeError::NotFound(id.to_string()))?;
        row.apply_completion(completion);
        Ok(())
    }

    async fn get_last_incomplete_track(&self) -> Result<Option<TrackPlayRecord>> {
        Ok(self
            .plays
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|p| p.was_completed != Some(true) && p.final_position_ms.is_some())
            .cloned())
    }

    async fn recent_track_plays(&self, limit: u32) -> Result<Vec<TrackPlayRecord>> {
        Ok(self
            .plays
            .lock()
            .unwrap()
            .iter()
            .rev()
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct MemorySettings {
    values: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl SettingsStore for MemorySettings {
    async fn set_string(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.lock().unwrap().get(key).cloned())
    }

    async fn set_bool(&self, key: &str, value: bool) -> Result<()> {
        self.set_string(key, &value.to_string()).await
    }

    async fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        Ok(self.get_string(key).await?.and_then(|v| v.parse().ok()))
    }

    async fn set_i64(&self, key: &str, value: i64) -> Result<()> {
        self.set_string(key, &value.to_string()).await
    }

    async fn get_i64(&self, key: &str) -> Result<Option<i64>> {
        Ok(self.get_string(key).await?.and_then(|v| v.parse().ok()))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.values.lock().unwrap().remove(key);
        Ok(())
    }

    async fn has_key(&self, key: &str) -> Result<bool> {
        Ok(self.values.lock().unwrap().contains_key(key))
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        Ok(self.values.lock().unwrap().keys().cloned().collect())
    }
}

// ============================================================================
// Wiring
// ============================================================================

/// Coordinator + tracker + session state wired the way a host wires them.
pub struct Stack {
    pub coordinator: CommandCoordinator,
    pub tracker: EventTracker,
    pub view: SessionStateView,
    pub bus: EventBus,
}

impl Stack {
    pub fn start(engine: &FakeEngine, config: &PlaybackConfig) -> Self {
        Self::start_with_subscribers(engine, config, 0).0
    }

    /// Like [`Stack::start`], also returning `n` tracker subscriptions made
    /// before any event is dispatched.
    pub fn start_with_subscribers(
        engine: &FakeEngine,
        config: &PlaybackConfig,
        n: usize,
    ) -> (Self, Vec<mpsc::UnboundedReceiver<core_playback::TrackedEvent>>) {
        let bus = EventBus::new(256);
        let mut tracker = EventTracker::new();
        let subscribers = (0..n).map(|_| tracker.subscribe()).collect();
        let (engine_tx, engine_rx) = mpsc::unbounded_channel();
        let coordinator = CommandCoordinator::start(
            Arc::new(engine.clone()),
            ConnectionToken::new("test-session"),
            CoordinatorSettings::from(config),
            engine_tx,
            tracker.handle(),
            bus.clone(),
        );
        let state = SessionState::new(
            config.poll_interval,
            Arc::new(coordinator.clone()),
            tracker.handle(),
        );
        let view = state.view();
        tracker.start(engine_rx, state);
        (
            Self {
                coordinator,
                tracker,
                view,
                bus,
            },
            subscribers,
        )
    }

    pub async fn shutdown(mut self) {
        self.tracker.stop().await;
        self.coordinator.release().await;
    }
}

/// Let spawned tasks run; with a paused clock this also advances time.
pub async fn settle() {
    core_async::sleep(Duration::from_millis(20)).await;
}

/// Poll `cond` until it holds, failing the test after ~10 s of (virtual) time.
pub async fn eventually(mut cond: impl FnMut() -> bool) {
    for _ in 0..500 {
        if cond() {
            return;
        }
        settle().await;
    }
    panic!("condition not met in time");
}
