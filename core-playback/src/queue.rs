//! # Queue Manager
//!
//! Owns the logical play queue. Queue-mutating operations are serialized by
//! an async lock so a load cannot interleave with a skip; the queue itself
//! is published through a `watch` channel and replaced wholesale.
//!
//! URL resolution happens here, item by item. An item that cannot be
//! resolved is left out of the queue; a collection with no resolvable item
//! leaves the engine untouched.

use std::sync::{Arc, Mutex as StdMutex};

use bridge_traits::{PlayableUrlResolver, RecordingCatalog, TrackInfo, TrackRef};
use core_async::spawn;
use core_async::sync::{mpsc, watch, CancellationToken, Mutex};
use core_async::task::JoinHandle;
use core_runtime::events::{CoreEvent, EventBus, QueueEvent};
use core_runtime::logging::strip_path;
use tracing::{debug, info, instrument, warn};

use crate::command::{Command, LoadQueueRequest};
use crate::coordinator::CommandCoordinator;
use crate::error::{PlaybackError, ResolutionError, Result};
use crate::events::{PlaybackEvent, TrackedEvent};
use crate::types::{PositionReport, Queue, QueueItem};

/// Cloneable handle to the play queue.
#[derive(Clone)]
pub struct QueueManager {
    inner: Arc<Inner>,
}

struct Inner {
    coordinator: CommandCoordinator,
    resolver: Arc<dyn PlayableUrlResolver>,
    catalog: Arc<dyn RecordingCatalog>,
    bus: EventBus,
    queue: watch::Sender<Queue>,
    op_lock: Mutex<()>,
    cancel: CancellationToken,
    follower: StdMutex<Option<JoinHandle<()>>>,
}

impl QueueManager {
    pub fn new(
        coordinator: CommandCoordinator,
        resolver: Arc<dyn PlayableUrlResolver>,
        catalog: Arc<dyn RecordingCatalog>,
        bus: EventBus,
    ) -> Self {
        let (queue, _) = watch::channel(Queue::default());
        Self {
            inner: Arc::new(Inner {
                coordinator,
                resolver,
                catalog,
                bus,
                queue,
                op_lock: Mutex::new(()),
                cancel: CancellationToken::new(),
                follower: StdMutex::new(None),
            }),
        }
    }

    /// Follow engine item transitions so the current index stays in sync.
    pub fn start(&self, mut events: mpsc::UnboundedReceiver<TrackedEvent>) {
        let inner = Arc::clone(&self.inner);
        let cancel = self.inner.cancel.clone();
        let handle = spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    event = events.recv() => match event {
                        Some(tracked) => inner.follow(&tracked),
                        None => break,
                    },
                }
            }
        });
        if let Ok(mut follower) = self.inner.follower.lock() {
            if let Some(previous) = follower.replace(handle) {
                previous.abort();
            }
        }
    }

    pub fn stop(&self) {
        self.inner.cancel.cancel();
        if let Ok(mut follower) = self.inner.follower.lock() {
            if let Some(handle) = follower.take() {
                handle.abort();
            }
        }
    }

    pub fn current(&self) -> Queue {
        self.inner.queue.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Queue> {
        let mut rx = self.inner.queue.subscribe();
        rx.mark_changed();
        rx
    }

    /// Resolve `items` and hand them to the engine as the new queue.
    ///
    /// Unresolvable items are skipped; if `start_index` pointed at one, the
    /// next playable item is used. An empty result is not an error: the
    /// engine is left untouched and a warning is logged.
    pub async fn load_queue(
        &self,
        items: Vec<TrackInfo>,
        start_index: usize,
        start_position_ms: u64,
        auto_play: bool,
    ) -> Result<()> {
        let _guard = self.inner.op_lock.lock().await;
        self.inner
            .load_locked(items, start_index, start_position_ms, auto_play, false)
            .await
    }

    /// Load `items` paused at `start_index`, failing with
    /// [`ResolutionError`] when that exact item cannot be resolved. The
    /// engine is not touched on failure.
    pub async fn load_exact(
        &self,
        items: Vec<TrackInfo>,
        start_index: usize,
        start_position_ms: u64,
    ) -> Result<()> {
        let _guard = self.inner.op_lock.lock().await;
        self.inner
            .load_locked(items, start_index, start_position_ms, false, true)
            .await
    }

    /// Play `track`, seeking within the current queue when it is already
    /// there and loading its whole recording otherwise.
    #[instrument(skip_all, fields(track = %track))]
    pub async fn play_track(&self, track: &TrackRef) -> Result<()> {
        let _guard = self.inner.op_lock.lock().await;

        let existing = self.inner.queue.borrow().position_of(track);
        if let Some(index) = existing {
            debug!(index, "Track already queued; seeking");
            let report = self
                .inner
                .coordinator
                .dispatch(Command::seek_to_item(index, 0))
                .await?;
            self.inner.set_current(report, Some(index));
            let report = self.inner.coordinator.dispatch(Command::Play).await?;
            self.inner.set_current(report, Some(index));
            return Ok(());
        }

        let collection = self.inner.collection_for(&track.recording_id).await?;
        let index = collection
            .iter()
            .position(|info| info.track == *track)
            .ok_or_else(|| PlaybackError::TrackNotInRecording(track.clone()))?;
        self.inner.load_locked(collection, index, 0, true, false).await
    }

    /// Tracks of a recording, in catalog order.
    pub async fn collection(&self, recording_id: &str) -> Result<Vec<TrackInfo>> {
        self.inner.collection_for(recording_id).await
    }

    pub async fn skip_next(&self) -> Result<()> {
        self.skip(Command::SkipNext).await
    }

    pub async fn skip_previous(&self) -> Result<()> {
        self.skip(Command::SkipPrevious).await
    }

    /// Move to `index` in the current queue without starting playback.
    pub async fn seek_to_item(&self, index: usize, position_ms: u64) -> Result<()> {
        let _guard = self.inner.op_lock.lock().await;
        let report = self
            .inner
            .coordinator
            .dispatch(Command::seek_to_item(index, position_ms))
            .await?;
        self.inner.set_current(report, Some(index));
        Ok(())
    }

    /// Run a queue-affecting command, keeping the queue model in step.
    /// Anything else goes straight to the coordinator.
    #[instrument(skip_all, fields(command = %command.kind()))]
    pub async fn submit(&self, command: Command) -> Result<()> {
        match command {
            Command::LoadQueue(request) => {
                let _guard = self.inner.op_lock.lock().await;
                self.inner.install(request).await
            }
            Command::PlayTrackImmediate(track) => {
                let _guard = self.inner.op_lock.lock().await;
                let fallback = self.inner.queue.borrow().position_of(&track);
                let report = self
                    .inner
                    .coordinator
                    .dispatch(Command::PlayTrackImmediate(track))
                    .await?;
                self.inner.set_current(report, fallback);
                Ok(())
            }
            Command::SkipNext => self.skip_next().await,
            Command::SkipPrevious => self.skip_previous().await,
            other => Ok(self.inner.coordinator.submit(other).await?),
        }
    }

    async fn skip(&self, command: Command) -> Result<()> {
        let _guard = self.inner.op_lock.lock().await;
        let report = self.inner.coordinator.dispatch(command).await?;
        self.inner.set_current(report, None);
        Ok(())
    }
}

impl Inner {
    async fn collection_for(&self, recording_id: &str) -> Result<Vec<TrackInfo>> {
        self.catalog
            .tracks_for_recording(recording_id)
            .await
            .map_err(|source| PlaybackError::Catalog {
                recording_id: recording_id.to_string(),
                source,
            })
    }

    async fn load_locked(
        &self,
        items: Vec<TrackInfo>,
        start_index: usize,
        start_position_ms: u64,
        auto_play: bool,
        require_start: bool,
    ) -> Result<()> {
        let recording_id = items.first().map(|i| i.track.recording_id.clone());
        let requested = items.len();

        let mut resolved = Vec::with_capacity(requested);
        let mut start = None;
        for (original_index, info) in items.into_iter().enumerate() {
            match self.resolver.resolve_playable_url(&info.track).await {
                Ok(source_url) => {
                    debug!(track = %info.track, url = %strip_path(&source_url), "Resolved queue item");
                    if start.is_none() && original_index >= start_index {
                        start = Some(resolved.len());
                    }
                    resolved.push(QueueItem {
                        track: info.track,
                        title: info.title,
                        source_url,
                        duration_ms: info.duration_ms,
                    });
                }
                Err(source) => {
                    let err = ResolutionError {
                        track: info.track,
                        source,
                    };
                    if require_start && original_index == start_index {
                        warn!(error = %err, "Start item unresolvable; queue left unchanged");
                        return Err(err.into());
                    }
                    warn!(error = %err, "Skipping unresolvable queue item");
                }
            }
        }

        let skipped = requested - resolved.len();
        if skipped > 0 {
            self.emit(QueueEvent::ItemsSkipped { count: skipped }.into());
        }

        if resolved.is_empty() {
            warn!(
                recording_id = recording_id.as_deref().unwrap_or(""),
                requested, "Collection has no playable items; queue left unchanged"
            );
            self.emit(QueueEvent::EmptyCollection { recording_id }.into());
            return Ok(());
        }

        let start = start.unwrap_or(resolved.len() - 1);
        debug!(skipped, "Resolved queue items");
        self.install(LoadQueueRequest {
            items: resolved,
            start_index: start,
            start_position_ms,
            auto_play,
        })
        .await
    }

    /// Hand already-resolved items to the engine and replace the queue.
    async fn install(&self, mut request: LoadQueueRequest) -> Result<()> {
        let recording_id = request.items.first().map(|i| i.track.recording_id.clone());
        if request.items.is_empty() {
            warn!("Empty queue requested; queue left unchanged");
            self.emit(QueueEvent::EmptyCollection { recording_id }.into());
            return Ok(());
        }
        request.start_index = request.start_index.min(request.items.len() - 1);
        let start = request.start_index;
        let items = request.items.clone();

        let report = self.coordinator.dispatch(Command::LoadQueue(request)).await?;

        let mut queue = Queue {
            items,
            current_index: Some(start),
        };
        if let Some(index) = report.and_then(|r| r.index) {
            queue.current_index = queue.clamp_index(index as i64);
        }
        let item_count = queue.len();
        self.queue.send_replace(queue);

        info!(item_count, start_index = start, "Queue loaded");
        self.emit(
            QueueEvent::Loaded {
                recording_id,
                item_count,
                start_index: start,
            }
            .into(),
        );
        Ok(())
    }

    /// Update the current index from a command report, falling back to
    /// `fallback` when the command was only buffered.
    fn set_current(&self, report: Option<PositionReport>, fallback: Option<usize>) {
        let target = match report {
            Some(report) => report.index.map(|i| i as i64),
            None => fallback.map(|i| i as i64),
        };
        let Some(raw) = target else {
            return;
        };
        self.update_index(|queue| queue.clamp_index(raw));
    }

    fn follow(&self, tracked: &TrackedEvent) {
        if let PlaybackEvent::ItemTransition { track, index, .. } = &tracked.event {
            let track = track.as_ref().map(|t| &t.track);
            self.update_index(|queue| queue.index_for_transition(track, *index));
        }
    }

    fn update_index(&self, pick: impl FnOnce(&Queue) -> Option<usize>) {
        let mut changed_to = None;
        self.queue.send_if_modified(|queue| {
            let next = pick(queue);
            if next == queue.current_index {
                return false;
            }
            queue.current_index = next;
            changed_to = next;
            true
        });
        if let Some(index) = changed_to {
            debug!(index, "Current queue index changed");
            self.emit(QueueEvent::CurrentIndexChanged { index }.into());
        }
    }

    fn emit(&self, event: CoreEvent) {
        let _ = self.bus.emit(event);
    }
}
