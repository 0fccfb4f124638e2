//! Normalized playback events fanned out by the tracker.

use bridge_traits::{DiscontinuityReason, PlaybackState, TransitionReason};
use core_async::time::Instant;

use crate::types::{CurrentTrack, ErrorDescriptor};

/// Engine callbacks after normalization, plus the derived session
/// boundaries and position samples.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    ItemTransition {
        track: Option<CurrentTrack>,
        /// Raw engine index; consumers clamp it against their own queue.
        index: i64,
        duration_ms: Option<u64>,
        reason: TransitionReason,
    },
    IsPlayingChanged(bool),
    StateChanged(PlaybackState),
    PositionDiscontinuity {
        old_ms: u64,
        new_ms: u64,
        reason: DiscontinuityReason,
    },
    Error(ErrorDescriptor),
    /// Emitted before the first `IsPlayingChanged(true)` of a session.
    SessionStart,
    /// Emitted after the event that ended the session.
    SessionEnd,
    /// Position sample taken while playing.
    Progress {
        position_ms: u64,
        duration_ms: Option<u64>,
    },
}

impl PlaybackEvent {
    pub fn name(&self) -> &'static str {
        match self {
            PlaybackEvent::ItemTransition { .. } => "item_transition",
            PlaybackEvent::IsPlayingChanged(_) => "is_playing_changed",
            PlaybackEvent::StateChanged(_) => "state_changed",
            PlaybackEvent::PositionDiscontinuity { .. } => "position_discontinuity",
            PlaybackEvent::Error(_) => "error",
            PlaybackEvent::SessionStart => "session_start",
            PlaybackEvent::SessionEnd => "session_end",
            PlaybackEvent::Progress { .. } => "progress",
        }
    }
}

/// A [`PlaybackEvent`] stamped with its monotonic arrival time.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedEvent {
    pub at: Instant,
    pub event: PlaybackEvent,
}

impl TrackedEvent {
    pub fn new(at: Instant, event: PlaybackEvent) -> Self {
        Self { at, event }
    }

    pub fn now(event: PlaybackEvent) -> Self {
        Self::new(Instant::now(), event)
    }
}
