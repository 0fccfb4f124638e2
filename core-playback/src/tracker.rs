//! # Event Tracker
//!
//! Single dispatch task for everything that changes playback state:
//!
//! - raw [`EngineEvent`]s from the engine callback channel,
//! - connection changes and position reports from the command coordinator,
//! - position samples from the poll timer.
//!
//! Each input is stamped with a monotonic [`Instant`], normalized into
//! [`PlaybackEvent`]s, applied to the [`SessionState`] and then fanned out
//! to subscribers in arrival order. Session boundaries are derived here:
//! `SessionStart` precedes the first "playing" of a session, `SessionEnd`
//! follows `Ended`, `Idle`, an engine error or a lost connection.

use bridge_traits::{EngineEvent, PlaybackState, TrackRef};
use core_async::sync::{mpsc, CancellationToken};
use core_async::task::JoinHandle;
use core_async::time::Instant;
use core_async::spawn;
use tracing::{debug, trace, warn};

use crate::events::{PlaybackEvent, TrackedEvent};
use crate::session_state::SessionState;
use crate::types::{ConnectionState, CurrentTrack, ErrorDescriptor, ErrorSource, PositionReport};

#[derive(Debug)]
pub(crate) enum TrackerInput {
    Connection(ConnectionState),
    Report(PositionReport),
    PollReport {
        generation: u64,
        report: PositionReport,
    },
    Failure(ErrorDescriptor),
    Subscribe(mpsc::UnboundedSender<TrackedEvent>),
}

/// Sending side into the tracker's dispatch task. Cheap to clone.
#[derive(Debug, Clone)]
pub struct TrackerHandle {
    tx: mpsc::UnboundedSender<TrackerInput>,
}

impl TrackerHandle {
    pub(crate) fn connection(&self, state: ConnectionState) {
        self.send(TrackerInput::Connection(state));
    }

    pub(crate) fn report(&self, report: PositionReport) {
        self.send(TrackerInput::Report(report));
    }

    pub(crate) fn poll_report(&self, generation: u64, report: PositionReport) {
        self.send(TrackerInput::PollReport { generation, report });
    }

    pub(crate) fn failure(&self, descriptor: ErrorDescriptor) {
        self.send(TrackerInput::Failure(descriptor));
    }

    /// Receive every event dispatched after this call.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<TrackedEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.send(TrackerInput::Subscribe(tx));
        rx
    }

    fn send(&self, input: TrackerInput) {
        if self.tx.send(input).is_err() {
            trace!("Event tracker stopped; input dropped");
        }
    }
}

/// Owner of the dispatch task.
pub struct EventTracker {
    handle: TrackerHandle,
    inbox: Option<mpsc::UnboundedReceiver<TrackerInput>>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Default for EventTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl EventTracker {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            handle: TrackerHandle { tx },
            inbox: Some(rx),
            cancel: CancellationToken::new(),
            task: None,
        }
    }

    pub fn handle(&self) -> TrackerHandle {
        self.handle.clone()
    }

    /// Subscriptions made before [`EventTracker::start`] see every event.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<TrackedEvent> {
        self.handle.subscribe()
    }

    /// Spawn the dispatch task. Calling it a second time has no effect.
    pub fn start(
        &mut self,
        engine_events: mpsc::UnboundedReceiver<EngineEvent>,
        state: SessionState,
    ) {
        let Some(inbox) = self.inbox.take() else {
            warn!("Event tracker already started");
            return;
        };
        let dispatcher = Dispatcher::new(state);
        let cancel = self.cancel.clone();
        self.task = Some(spawn(dispatcher.run(engine_events, inbox, cancel)));
        debug!("Event tracker started");
    }

    /// Stop dispatching and wait for the task to finish. The session state
    /// (and its poll timer) is dropped with the task.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Event tracker task ended abnormally");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }
}

struct Dispatcher {
    state: SessionState,
    subscribers: Vec<mpsc::UnboundedSender<TrackedEvent>>,
    session_active: bool,
}

impl Dispatcher {
    fn new(state: SessionState) -> Self {
        Self {
            state,
            subscribers: Vec::new(),
            session_active: false,
        }
    }

    async fn run(
        mut self,
        mut engine_events: mpsc::UnboundedReceiver<EngineEvent>,
        mut inbox: mpsc::UnboundedReceiver<TrackerInput>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(input) = inbox.recv() => {
                    // Callbacks raised by the command come before its report.
                    if matches!(input, TrackerInput::Report(_)) {
                        while let Ok(raw) = engine_events.try_recv() {
                            self.on_engine(raw);
                        }
                    }
                    self.on_input(input);
                }
                Some(raw) = engine_events.recv() => self.on_engine(raw),
                else => break,
            }
        }
        debug!("Event tracker stopped");
    }

    fn on_engine(&mut self, raw: EngineEvent) {
        let at = Instant::now();
        trace!(event = ?raw, "Engine event");
        for event in self.normalize(raw) {
            self.dispatch(TrackedEvent::new(at, event));
        }
    }

    fn on_input(&mut self, input: TrackerInput) {
        match input {
            TrackerInput::Connection(state) => {
                self.state.set_connection(state);
                if !state.is_connected() && self.session_active {
                    self.session_active = false;
                    self.dispatch(TrackedEvent::now(PlaybackEvent::SessionEnd));
                }
            }
            TrackerInput::Report(report) => {
                self.dispatch(TrackedEvent::now(PlaybackEvent::Progress {
                    position_ms: report.position_ms,
                    duration_ms: report.duration_ms,
                }));
            }
            TrackerInput::PollReport { generation, report } => {
                if !self.state.accepts_poll(generation) {
                    trace!(generation, "Stale position sample dropped");
                    return;
                }
                self.dispatch(TrackedEvent::now(PlaybackEvent::Progress {
                    position_ms: report.position_ms,
                    duration_ms: report.duration_ms,
                }));
            }
            TrackerInput::Failure(descriptor) => self.state.set_error(descriptor),
            TrackerInput::Subscribe(tx) => self.subscribers.push(tx),
        }
    }

    fn normalize(&mut self, raw: EngineEvent) -> Vec<PlaybackEvent> {
        match raw {
            EngineEvent::ItemTransition {
                media_id,
                title,
                index,
                duration_ms,
                reason,
            } => {
                let track = media_id.as_deref().and_then(|id| {
                    let parsed = TrackRef::from_key(id);
                    if parsed.is_none() {
                        warn!(media_id = id, "Engine reported an unknown media id");
                    }
                    parsed
                });
                vec![PlaybackEvent::ItemTransition {
                    track: track.map(|track| CurrentTrack { track, title }),
                    index,
                    duration_ms: duration_ms.filter(|d| *d > 0).map(|d| d as u64),
                    reason,
                }]
            }
            EngineEvent::IsPlayingChanged(true) => {
                if self.session_active {
                    vec![PlaybackEvent::IsPlayingChanged(true)]
                } else {
                    self.session_active = true;
                    vec![
                        PlaybackEvent::SessionStart,
                        PlaybackEvent::IsPlayingChanged(true),
                    ]
                }
            }
            EngineEvent::IsPlayingChanged(false) => vec![PlaybackEvent::IsPlayingChanged(false)],
            EngineEvent::PlaybackStateChanged(state) => {
                let mut events = vec![PlaybackEvent::StateChanged(state)];
                let ends_session = matches!(state, PlaybackState::Ended | PlaybackState::Idle);
                if ends_session && self.session_active {
                    self.session_active = false;
                    events.push(PlaybackEvent::SessionEnd);
                }
                events
            }
            EngineEvent::PositionDiscontinuity {
                old_ms,
                new_ms,
                reason,
            } => vec![PlaybackEvent::PositionDiscontinuity {
                old_ms: old_ms.max(0) as u64,
                new_ms: new_ms.max(0) as u64,
                reason,
            }],
            EngineEvent::Error { code, message } => {
                warn!(code = %code, message = %message, "Engine reported an error");
                let mut events = vec![PlaybackEvent::Error(ErrorDescriptor::new(
                    ErrorSource::Engine,
                    code,
                    message,
                ))];
                if self.session_active {
                    self.session_active = false;
                    events.push(PlaybackEvent::SessionEnd);
                }
                events
            }
        }
    }

    fn dispatch(&mut self, tracked: TrackedEvent) {
        trace!(event = tracked.event.name(), "Dispatching playback event");
        self.state.apply(&tracked);
        self.subscribers
            .retain(|subscriber| subscriber.send(tracked.clone()).is_ok());
    }
}
