//! # History Session Manager
//!
//! Turns the tracked event stream into listening sessions and track plays.
//!
//! Played time is accumulated from event timestamps while the engine is
//! playing, never from wall-clock reads, so a paused track does not gain
//! time. A play is written as soon as it becomes a meaningful listen and is
//! checkpointed periodically after that, so a crash loses at most one
//! checkpoint interval. A play that never becomes meaningful is discarded
//! when it closes.
//!
//! Storage failures are logged and reported on the event bus; they never
//! reach playback.

use std::sync::{Arc, Mutex as StdMutex};

use bridge_traits::{
    BridgeError, Clock, HistoryStore, ListeningSession, PlaybackState, SettingsStore,
    TrackCompletion, TrackEndReason, TrackPlayRecord, TrackRef, TransitionReason,
};
use core_async::spawn;
use core_async::sync::{mpsc, CancellationToken};
use core_async::task::JoinHandle;
use core_async::time::{as_millis_u64, Duration, Instant};
use core_runtime::events::{CoreEvent, EventBus, HistoryEvent};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::HistoryPolicy;
use crate::error::StorageError;
use crate::events::{PlaybackEvent, TrackedEvent};
use crate::last_played::{self, LastPlayed};

const DEFAULT_END_TOLERANCE_MS: u64 = 1_000;

/// Runs a [`HistoryRecorder`] on the tracker's event stream.
pub struct HistorySessionManager {
    recorder: StdMutex<Option<HistoryRecorder>>,
    cancel: CancellationToken,
    task: StdMutex<Option<JoinHandle<()>>>,
}

impl HistorySessionManager {
    pub fn new(recorder: HistoryRecorder) -> Self {
        Self {
            recorder: StdMutex::new(Some(recorder)),
            cancel: CancellationToken::new(),
            task: StdMutex::new(None),
        }
    }

    /// Start consuming events. Has no effect after the first call.
    pub fn start(&self, mut events: mpsc::UnboundedReceiver<TrackedEvent>) {
        let recorder = self.recorder.lock().ok().and_then(|mut r| r.take());
        let Some(mut recorder) = recorder else {
            warn!("History session manager already started");
            return;
        };
        let cancel = self.cancel.clone();
        let handle = spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    event = events.recv() => match event {
                        Some(tracked) => recorder.handle(&tracked).await,
                        None => break,
                    },
                }
            }
            while let Ok(tracked) = events.try_recv() {
                recorder.handle(&tracked).await;
            }
            recorder.shutdown(Instant::now()).await;
        });
        if let Ok(mut task) = self.task.lock() {
            *task = Some(handle);
        }
    }

    /// Stop consuming events, closing the open play and session.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let handle = self.task.lock().ok().and_then(|mut task| task.take());
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "History task ended abnormally");
            }
        }
    }
}

/// State machine behind [`HistorySessionManager`].
pub struct HistoryRecorder {
    store: Arc<dyn HistoryStore>,
    settings: Arc<dyn SettingsStore>,
    clock: Arc<dyn Clock>,
    policy: HistoryPolicy,
    checkpoint_interval_ms: u64,
    end_tolerance_ms: u64,
    bus: EventBus,
    current: Option<CurrentItem>,
    session: Option<ListeningSession>,
    open: Option<OpenPlay>,
    playing: bool,
}

#[derive(Debug, Clone)]
struct CurrentItem {
    track: TrackRef,
    title: String,
    duration_ms: Option<u64>,
}

#[derive(Debug)]
struct OpenPlay {
    record: TrackPlayRecord,
    row_id: Option<i64>,
    clock: PlayClock,
    checkpointed_ms: u64,
}

/// Played-time and position accumulator for one play.
#[derive(Debug, Clone, Default)]
struct PlayClock {
    played_ms: u64,
    position_ms: u64,
    duration_ms: Option<u64>,
    /// Set while playing.
    anchor: Option<Instant>,
}

impl PlayClock {
    fn accrue(&mut self, at: Instant) {
        if let Some(anchor) = self.anchor {
            let elapsed = as_millis_u64(at.saturating_duration_since(anchor));
            self.played_ms = self.played_ms.saturating_add(elapsed);
            self.position_ms = self.position_ms.saturating_add(elapsed);
            self.anchor = Some(at);
        }
    }

    fn resume(&mut self, at: Instant) {
        self.accrue(at);
        self.anchor = Some(at);
    }

    fn pause(&mut self, at: Instant) {
        self.accrue(at);
        self.anchor = None;
    }

    fn seek(&mut self, at: Instant, position_ms: u64) {
        self.accrue(at);
        self.position_ms = position_ms;
    }

    fn sync(&mut self, at: Instant, position_ms: u64, duration_ms: Option<u64>) {
        self.accrue(at);
        self.position_ms = position_ms;
        if duration_ms.is_some() {
            self.duration_ms = duration_ms;
        }
    }

    /// Natural end: the position is the duration, provided the last known
    /// position is within `tolerance_ms` of it.
    fn finish(&mut self, tolerance_ms: u64) {
        if let Some(duration) = self.duration_ms {
            if duration.saturating_sub(self.position_ms) <= tolerance_ms {
                self.position_ms = duration;
            }
        }
    }

    fn final_position(&self) -> u64 {
        match self.duration_ms {
            Some(duration) if duration > 0 => self.position_ms.min(duration),
            _ => self.position_ms,
        }
    }
}

impl HistoryRecorder {
    pub fn new(
        store: Arc<dyn HistoryStore>,
        settings: Arc<dyn SettingsStore>,
        clock: Arc<dyn Clock>,
        policy: HistoryPolicy,
        checkpoint_interval: Duration,
        bus: EventBus,
    ) -> Self {
        Self {
            store,
            settings,
            clock,
            policy,
            checkpoint_interval_ms: as_millis_u64(checkpoint_interval),
            end_tolerance_ms: DEFAULT_END_TOLERANCE_MS,
            bus,
            current: None,
            session: None,
            open: None,
            playing: false,
        }
    }

    /// How far short of the duration a natural end may land and still be
    /// recorded as played to the end. Normally the position poll interval.
    pub fn with_end_tolerance(mut self, tolerance: Duration) -> Self {
        self.end_tolerance_ms = as_millis_u64(tolerance);
        self
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.session_id.as_str())
    }

    pub async fn handle(&mut self, tracked: &TrackedEvent) {
        let at = tracked.at;
        match &tracked.event {
            PlaybackEvent::SessionStart => self.open_session(at).await,
            PlaybackEvent::SessionEnd => {
                self.close_play(at, TrackEndReason::SessionEnded).await;
                self.close_session().await;
            }
            PlaybackEvent::ItemTransition {
                track,
                duration_ms,
                reason,
                ..
            } => {
                let end_reason = match reason {
                    TransitionReason::Auto => TrackEndReason::AutoAdvance,
                    TransitionReason::Seek => TrackEndReason::Seek,
                    TransitionReason::Repeat => TrackEndReason::Repeat,
                    TransitionReason::PlaylistChanged => TrackEndReason::QueueReplaced,
                };
                self.close_play(at, end_reason).await;
                self.current = track.as_ref().map(|current| CurrentItem {
                    track: current.track.clone(),
                    title: current.title.clone().unwrap_or_default(),
                    duration_ms: *duration_ms,
                });
                self.open_play(at);
            }
            PlaybackEvent::IsPlayingChanged(playing) => {
                self.playing = *playing;
                if let Some(open) = self.open.as_mut() {
                    if *playing {
                        open.clock.resume(at);
                    } else {
                        open.clock.pause(at);
                    }
                }
                if !*playing {
                    self.checkpoint(at).await;
                }
            }
            PlaybackEvent::StateChanged(PlaybackState::Ended) => {
                self.close_play(at, TrackEndReason::AutoAdvance).await;
            }
            PlaybackEvent::StateChanged(_) => {}
            PlaybackEvent::PositionDiscontinuity { new_ms, .. } => {
                if let Some(open) = self.open.as_mut() {
                    open.clock.seek(at, *new_ms);
                }
            }
            PlaybackEvent::Error(_) => self.close_play(at, TrackEndReason::Error).await,
            PlaybackEvent::Progress {
                position_ms,
                duration_ms,
            } => {
                if let Some(open) = self.open.as_mut() {
                    open.clock.sync(at, *position_ms, *duration_ms);
                }
                self.checkpoint(at).await;
            }
        }
    }

    /// Close whatever is open, as on application shutdown.
    pub async fn shutdown(&mut self, at: Instant) {
        self.close_play(at, TrackEndReason::Shutdown).await;
        self.close_session().await;
    }

    async fn open_session(&mut self, at: Instant) {
        if self.session.is_some() {
            return;
        }
        let session = ListeningSession {
            session_id: Uuid::new_v4().to_string(),
            started_at: self.clock.now(),
            ended_at: None,
        };
        if let Err(e) = self.store.start_session(&session).await {
            storage_failed(&self.bus, "start_session", e);
        }
        info!(session_id = %session.session_id, "Listening session opened");
        emit(
            &self.bus,
            HistoryEvent::SessionOpened {
                session_id: session.session_id.clone(),
            },
        );
        self.session = Some(session);
        self.open_play(at);
    }

    async fn close_session(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        if let Err(e) = self
            .store
            .complete_session(&session.session_id, self.clock.now())
            .await
        {
            storage_failed(&self.bus, "complete_session", e);
        }
        info!(session_id = %session.session_id, "Listening session closed");
        emit(
            &self.bus,
            HistoryEvent::SessionClosed {
                session_id: session.session_id,
            },
        );
    }

    fn open_play(&mut self, at: Instant) {
        let (Some(current), Some(session)) = (&self.current, &self.session) else {
            return;
        };
        if self.open.is_some() {
            return;
        }
        let record = TrackPlayRecord {
            id: None,
            track: current.track.clone(),
            title: current.title.clone(),
            session_id: session.session_id.clone(),
            started_at: self.clock.now(),
            duration_ms: current.duration_ms,
            completed_at: None,
            final_position_ms: None,
            played_duration_ms: None,
            was_completed: None,
            transition_reason: None,
        };
        let clock = PlayClock {
            duration_ms: current.duration_ms,
            anchor: self.playing.then_some(at),
            ..Default::default()
        };
        debug!(track = %record.track, "Track play opened");
        self.open = Some(OpenPlay {
            record,
            row_id: None,
            clock,
            checkpointed_ms: 0,
        });
    }

    /// Insert the open play once it is meaningful, then write progress every
    /// checkpoint interval.
    async fn checkpoint(&mut self, at: Instant) {
        let Some(open) = self.open.as_mut() else {
            return;
        };
        open.clock.accrue(at);
        let played = open.clock.played_ms;
        let position = open.clock.final_position();

        match open.row_id {
            None => {
                if !self
                    .policy
                    .is_meaningful_listen(played, open.clock.duration_ms)
                {
                    return;
                }
                let mut record = open.record.clone();
                record.final_position_ms = Some(position);
                record.played_duration_ms = Some(played);
                record.duration_ms = open.clock.duration_ms.or(record.duration_ms);
                match self.store.insert_track_play(&record).await {
                    Ok(id) => {
                        debug!(id, track = %record.track, played_ms = played, "Track play inserted");
                        open.row_id = Some(id);
                        open.checkpointed_ms = played;
                    }
                    Err(e) => {
                        storage_failed(&self.bus, "insert_track_play", e);
                        return;
                    }
                }
            }
            Some(id) => {
                if played.saturating_sub(open.checkpointed_ms) < self.checkpoint_interval_ms {
                    return;
                }
                if let Err(e) = self
                    .store
                    .update_track_play_progress(id, position, played)
                    .await
                {
                    storage_failed(&self.bus, "update_track_play_progress", e);
                    return;
                }
                open.checkpointed_ms = played;
            }
        }

        let last = LastPlayed {
            track: open.record.track.clone(),
            title: open.record.title.clone(),
            position_ms: position,
            duration_ms: open.clock.duration_ms,
            was_completed: false,
            started_at: open.record.started_at,
            updated_at: self.clock.now(),
        };
        save_last_played(self.settings.as_ref(), &self.bus, &last).await;
    }

    async fn close_play(&mut self, at: Instant, reason: TrackEndReason) {
        let Some(mut open) = self.open.take() else {
            return;
        };
        open.clock.accrue(at);
        if reason == TrackEndReason::AutoAdvance {
            open.clock.finish(self.end_tolerance_ms);
        }

        let played = open.clock.played_ms;
        let final_position = open.clock.final_position();
        let duration = open.clock.duration_ms;
        let was_completed = self.policy.is_completed(final_position, duration);
        let completion = TrackCompletion {
            completed_at: self.clock.now(),
            final_position_ms: final_position,
            played_duration_ms: played,
            duration_ms: duration,
            was_completed,
            reason,
        };
        let track = open.record.track.to_string();

        if let Some(id) = open.row_id {
            if let Err(e) = self.store.update_track_play_completion(id, &completion).await {
                storage_failed(&self.bus, "update_track_play_completion", e);
                return;
            }
        } else if self.policy.is_meaningful_listen(played, duration) {
            let mut record = open.record.clone();
            record.apply_completion(&completion);
            if let Err(e) = self.store.insert_track_play(&record).await {
                storage_failed(&self.bus, "insert_track_play", e);
                return;
            }
        } else {
            debug!(track = %track, played_ms = played, reason = %reason, "Track play discarded");
            emit(
                &self.bus,
                HistoryEvent::TrackDiscarded {
                    track,
                    played_ms: played,
                },
            );
            return;
        }

        info!(
            track = %track,
            played_ms = played,
            completed = was_completed,
            reason = %reason,
            "Track play recorded"
        );
        emit(
            &self.bus,
            HistoryEvent::TrackPersisted {
                track,
                played_ms: played,
                completed: was_completed,
            },
        );

        let last = LastPlayed {
            track: open.record.track,
            title: open.record.title,
            position_ms: final_position,
            duration_ms: duration,
            was_completed,
            started_at: open.record.started_at,
            updated_at: self.clock.now(),
        };
        save_last_played(self.settings.as_ref(), &self.bus, &last).await;
    }
}

fn emit(bus: &EventBus, event: HistoryEvent) {
    let _ = bus.emit(CoreEvent::History(event));
}

fn storage_failed(bus: &EventBus, operation: &'static str, source: BridgeError) {
    let err = StorageError { operation, source };
    warn!(error = %err, "History write failed; continuing");
    emit(
        bus,
        HistoryEvent::StorageFailed {
            operation: operation.to_string(),
            message: err.source.to_string(),
        },
    );
}

async fn save_last_played(settings: &dyn SettingsStore, bus: &EventBus, record: &LastPlayed) {
    if let Err(e) = last_played::save(settings, record).await {
        storage_failed(bus, "save_last_played", e);
    }
}
