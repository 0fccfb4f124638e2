//! # Session State
//!
//! Owns the authoritative [`PlaybackSnapshot`]. Only the event tracker's
//! dispatch task mutates it; everyone else reads through a
//! [`SessionStateView`], which is backed by a `watch` channel so readers
//! always see a whole snapshot and late subscribers get the latest value
//! immediately.
//!
//! While the engine is playing, a [`PeriodicTimer`] samples the position via
//! a [`PositionProbe`]. Samples carry the generation of the ticker that took
//! them; the tracker drops samples from a ticker that has since been stopped,
//! so a pause is never followed by a stale position update.

use std::sync::Arc;

use async_trait::async_trait;
use bridge_traits::{PlaybackState, TransitionReason};
use core_async::sync::watch;
use core_async::time::Duration;
use core_async::{spawn, PeriodicTimer};
use tracing::{debug, trace};

use crate::error::CommandError;
use crate::events::{PlaybackEvent, TrackedEvent};
use crate::tracker::TrackerHandle;
use crate::types::{ConnectionState, ErrorDescriptor, PlaybackSnapshot, PositionReport};

/// Reads the engine position on demand.
#[async_trait]
pub trait PositionProbe: Send + Sync {
    async fn probe(&self) -> Result<PositionReport, CommandError>;
}

/// Writer side of the playback snapshot.
pub struct SessionState {
    snapshot: watch::Sender<PlaybackSnapshot>,
    poll_interval: Duration,
    poller: PeriodicTimer,
    poll_generation: u64,
    polling: bool,
    probe: Arc<dyn PositionProbe>,
    tracker: TrackerHandle,
}

impl SessionState {
    pub fn new(
        poll_interval: Duration,
        probe: Arc<dyn PositionProbe>,
        tracker: TrackerHandle,
    ) -> Self {
        let (snapshot, _) = watch::channel(PlaybackSnapshot::default());
        Self {
            snapshot,
            poll_interval,
            poller: PeriodicTimer::new("position-poll"),
            poll_generation: 0,
            polling: false,
            probe,
            tracker,
        }
    }

    pub fn view(&self) -> SessionStateView {
        SessionStateView {
            rx: self.snapshot.subscribe(),
        }
    }

    pub fn current(&self) -> PlaybackSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Fold one normalized event into the snapshot.
    pub fn apply(&mut self, tracked: &TrackedEvent) {
        let mut next = self.current();
        match &tracked.event {
            PlaybackEvent::ItemTransition {
                track,
                duration_ms,
                reason,
                ..
            } => {
                if track.is_none() || *reason != TransitionReason::Seek {
                    next.position_ms = 0;
                }
                next.current_track = track.clone();
                next.duration_ms = *duration_ms;
            }
            PlaybackEvent::IsPlayingChanged(playing) => {
                next.is_playing = *playing;
                if *playing {
                    if next.playback_state == PlaybackState::Idle {
                        next.playback_state = PlaybackState::Buffering;
                    }
                    next.last_error = None;
                    self.start_polling();
                } else {
                    self.stop_polling();
                }
            }
            PlaybackEvent::StateChanged(state) => {
                next.playback_state = *state;
                match state {
                    PlaybackState::Idle => {
                        next.is_playing = false;
                        self.stop_polling();
                    }
                    PlaybackState::Ready => self.probe_once(),
                    PlaybackState::Buffering | PlaybackState::Ended => {}
                }
            }
            PlaybackEvent::PositionDiscontinuity { new_ms, .. } => {
                if next.current_track.is_some() {
                    next.position_ms = *new_ms;
                }
            }
            PlaybackEvent::Error(descriptor) => {
                next.last_error = Some(descriptor.clone());
                next.is_playing = false;
                self.stop_polling();
            }
            PlaybackEvent::Progress {
                position_ms,
                duration_ms,
            } => {
                if next.current_track.is_some() {
                    next.position_ms = *position_ms;
                }
                if duration_ms.is_some() {
                    next.duration_ms = *duration_ms;
                }
            }
            PlaybackEvent::SessionStart | PlaybackEvent::SessionEnd => return,
        }
        self.publish(next);
    }

    /// Reconcile with a position read back after a command.
    pub fn set_connection(&mut self, state: ConnectionState) {
        let mut next = self.current();
        next.connection_state = state;
        if !state.is_connected() {
            next.is_playing = false;
            self.stop_polling();
        }
        self.publish(next);
    }

    pub fn set_error(&mut self, descriptor: ErrorDescriptor) {
        let mut next = self.current();
        next.last_error = Some(descriptor);
        self.publish(next);
    }

    /// Whether a sample from ticker `generation` may still be applied.
    pub fn accepts_poll(&self, generation: u64) -> bool {
        self.polling && generation == self.poll_generation
    }

    pub fn is_polling(&self) -> bool {
        self.polling && self.poller.is_running()
    }

    fn publish(&self, next: PlaybackSnapshot) {
        self.snapshot.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    fn start_polling(&mut self) {
        self.poll_generation += 1;
        self.polling = true;
        let generation = self.poll_generation;
        let probe = Arc::clone(&self.probe);
        let tracker = self.tracker.clone();
        self.poller.start(self.poll_interval, move || {
            let probe = Arc::clone(&probe);
            let tracker = tracker.clone();
            async move {
                match probe.probe().await {
                    Ok(report) => tracker.poll_report(generation, report),
                    Err(e) => trace!(error = %e, "Position poll skipped"),
                }
            }
        });
        debug!(generation, "Position polling started");
    }

    fn stop_polling(&mut self) {
        if self.polling {
            debug!(generation = self.poll_generation, "Position polling stopped");
        }
        self.polling = false;
        self.poller.stop();
    }

    /// Read the duration once the engine reports it can play.
    fn probe_once(&self) {
        let probe = Arc::clone(&self.probe);
        let tracker = self.tracker.clone();
        spawn(async move {
            if let Ok(report) = probe.probe().await {
                tracker.report(report);
            }
        });
    }
}

/// Read side of the playback snapshot. Cheap to clone.
#[derive(Debug, Clone)]
pub struct SessionStateView {
    rx: watch::Receiver<PlaybackSnapshot>,
}

impl SessionStateView {
    pub fn current(&self) -> PlaybackSnapshot {
        self.rx.borrow().clone()
    }

    /// Subscribe to snapshot changes; the receiver starts with the current
    /// snapshot marked as unseen.
    pub fn subscribe(&self) -> watch::Receiver<PlaybackSnapshot> {
        let mut rx = self.rx.clone();
        rx.mark_changed();
        rx
    }
}
