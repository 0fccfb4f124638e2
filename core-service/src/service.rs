//! The host-facing playback service.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bridge_traits::{HistoryStore, TrackInfo, TrackPlayRecord, TrackRef};
use core_async::sync::{broadcast, mpsc, watch, Mutex};
use core_async::time::Duration;
use core_playback::{
    Command, CommandCoordinator, ConnectionState, CoordinatorSettings, EventTracker,
    HistoryRecorder, HistorySessionManager, PlaybackConfig, PlaybackSnapshot, Queue,
    QueueManager, ResumeCandidate, ResumeCoordinator, SessionState, SessionStateView,
};
use core_runtime::config::CoreConfig;
use core_runtime::events::{CoreEvent, EventBus, EventSeverity, EventStream};
use tracing::{debug, info, instrument, warn};

use crate::error::{CoreError, Result};

/// One playback session core, wired from a [`CoreConfig`].
///
/// Cloning is cheap; every clone drives the same components.
#[derive(Clone)]
pub struct PlaybackService {
    inner: Arc<Inner>,
}

struct Inner {
    bus: EventBus,
    coordinator: CommandCoordinator,
    tracker: Mutex<EventTracker>,
    view: SessionStateView,
    queue: QueueManager,
    history: HistorySessionManager,
    resume: ResumeCoordinator,
    history_store: Arc<dyn HistoryStore>,
    released: AtomicBool,
}

impl PlaybackService {
    /// Wire every component and start connecting to the engine.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(config: CoreConfig, playback: PlaybackConfig) -> Result<Self> {
        playback.validate().map_err(CoreError::Config)?;

        let bus = EventBus::new(config.event_buffer_size);
        let mut tracker = EventTracker::new();
        // Subscribe before the tracker starts so no event is missed.
        let queue_events = tracker.subscribe();
        let history_events = tracker.subscribe();

        let (engine_tx, engine_rx) = mpsc::unbounded_channel();
        let coordinator = CommandCoordinator::start(
            Arc::clone(&config.engine_connector),
            config.connection_token.clone(),
            CoordinatorSettings::from(&playback),
            engine_tx,
            tracker.handle(),
            bus.clone(),
        );

        let state = SessionState::new(
            playback.poll_interval,
            Arc::new(coordinator.clone()),
            tracker.handle(),
        );
        let view = state.view();
        tracker.start(engine_rx, state);

        let queue = QueueManager::new(
            coordinator.clone(),
            Arc::clone(&config.resolver),
            Arc::clone(&config.catalog),
            bus.clone(),
        );
        queue.start(queue_events);

        let history = HistorySessionManager::new(HistoryRecorder::new(
            Arc::clone(&config.history_store),
            Arc::clone(&config.settings_store),
            Arc::clone(&config.clock),
            playback.history.clone(),
            playback.history_checkpoint_interval,
            bus.clone(),
        )
        .with_end_tolerance(playback.poll_interval));
        history.start(history_events);

        let resume = ResumeCoordinator::new(
            Arc::clone(&config.history_store),
            Arc::clone(&config.settings_store),
            Arc::clone(&config.clock),
            queue.clone(),
            coordinator.clone(),
            playback.resume.clone(),
            playback.resume_connect_timeout,
        );

        info!(
            poll_interval_ms = playback.poll_interval.as_millis() as u64,
            pending_capacity = playback.pending_command_capacity,
            "Playback service started"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                bus,
                coordinator,
                tracker: Mutex::new(tracker),
                view,
                queue,
                history,
                resume,
                history_store: config.history_store,
                released: AtomicBool::new(false),
            }),
        })
    }

    // ------------------------------------------------------------------
    // Observation
    // ------------------------------------------------------------------

    pub fn snapshot(&self) -> PlaybackSnapshot {
        self.inner.view.current()
    }

    /// Snapshot updates. The current value is delivered first.
    pub fn subscribe(&self) -> watch::Receiver<PlaybackSnapshot> {
        self.inner.view.subscribe()
    }

    pub fn queue(&self) -> Queue {
        self.inner.queue.current()
    }

    pub fn subscribe_queue(&self) -> watch::Receiver<Queue> {
        self.inner.queue.subscribe()
    }

    /// Diagnostic events (connection transitions, evictions, history writes).
    pub fn events(&self) -> broadcast::Receiver<CoreEvent> {
        self.inner.bus.subscribe()
    }

    /// Diagnostic events at warning severity or above.
    pub fn warnings(&self) -> EventStream {
        EventStream::new(self.inner.bus.subscribe())
            .filter(|event| event.severity() >= EventSeverity::Warning)
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.coordinator.connection_state()
    }

    pub async fn wait_connected(&self, timeout: Duration) -> Result<()> {
        Ok(self.inner.coordinator.wait_connected(timeout).await?)
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    /// Submit a command. Queue-affecting commands go through the queue
    /// manager so the queue model follows the engine.
    pub async fn submit(&self, command: Command) -> Result<()> {
        self.ensure_live()?;
        Ok(self.inner.queue.submit(command).await?)
    }

    pub async fn load_queue(
        &self,
        items: Vec<TrackInfo>,
        start_index: usize,
        start_position_ms: u64,
        auto_play: bool,
    ) -> Result<()> {
        self.ensure_live()?;
        Ok(self
            .inner
            .queue
            .load_queue(items, start_index, start_position_ms, auto_play)
            .await?)
    }

    pub async fn play_track(&self, track: &TrackRef) -> Result<()> {
        self.ensure_live()?;
        Ok(self.inner.queue.play_track(track).await?)
    }

    // ------------------------------------------------------------------
    // Resume and history
    // ------------------------------------------------------------------

    pub async fn find_resume_candidate(&self) -> Option<ResumeCandidate> {
        self.inner.resume.find_resume_candidate().await
    }

    pub async fn resume(&self, candidate: &ResumeCandidate) -> Result<()> {
        self.ensure_live()?;
        Ok(self.inner.resume.resume(candidate).await?)
    }

    /// Resume the most recent eligible play, if any. Returns what was
    /// restored.
    #[instrument(skip(self))]
    pub async fn restore_last_session(&self) -> Result<Option<ResumeCandidate>> {
        self.ensure_live()?;
        let Some(candidate) = self.find_resume_candidate().await else {
            debug!("Nothing to restore");
            return Ok(None);
        };
        self.resume(&candidate).await?;
        Ok(Some(candidate))
    }

    /// Most recent track plays, newest first.
    pub async fn recent_plays(&self, limit: u32) -> Result<Vec<TrackPlayRecord>> {
        Ok(self.inner.history_store.recent_track_plays(limit).await?)
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Stop every component and release the engine connection. The open
    /// track play and session are closed first. Further calls are no-ops.
    pub async fn release(&self) {
        if self.inner.released.swap(true, Ordering::SeqCst) {
            warn!("Playback service already released");
            return;
        }
        self.inner.queue.stop();
        self.inner.history.stop().await;
        self.inner.tracker.lock().await.stop().await;
        self.inner.coordinator.release().await;
        info!("Playback service released");
    }

    pub fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::SeqCst)
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_released() {
            return Err(CoreError::Released);
        }
        Ok(())
    }
}
