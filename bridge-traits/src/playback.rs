//! Playback engine bridge.
//!
//! The engine is the out-of-process (or out-of-thread) player that actually
//! renders audio. The core talks to it through two traits:
//!
//! - [`EngineConnector`] establishes a connection and hands back an
//!   [`EngineConnection`].
//! - [`EngineSession`] is the live handle. It is `Send` but deliberately not
//!   `Sync`, and every method takes `&mut self`: the engine requires all calls
//!   to come from one execution context, so the handle can only ever be owned
//!   by a single task.
//!
//! Engine callbacks are delivered as [`EngineEvent`] values over the
//! [`EngineEventSender`] passed to `connect`.

use async_trait::async_trait;
use core_async::sync::{mpsc, oneshot};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Coarse engine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PlaybackState {
    /// Nothing loaded, or playback stopped.
    #[default]
    Idle,
    /// Loading or rebuffering.
    Buffering,
    /// Can play immediately from the current position.
    Ready,
    /// Reached the end of the queue.
    Ended,
}

/// Repeat behaviour of the engine queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RepeatMode {
    #[default]
    Off,
    One,
    All,
}

/// Why the engine's current item changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransitionReason {
    /// Previous item played to its end.
    Auto,
    /// Seek or skip to another item.
    Seek,
    /// Repeat of the same item.
    Repeat,
    /// Queue was replaced.
    PlaylistChanged,
}

/// Why the playback position jumped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiscontinuityReason {
    AutoTransition,
    Seek,
    SeekAdjustment,
    Skip,
    Remove,
    Internal,
}

/// Raw engine callback.
///
/// Positions and indices are signed because engines use negative sentinels
/// for "unset"; the core clamps them before use.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    ItemTransition {
        /// Media id of the new current item, `None` when the queue emptied.
        media_id: Option<String>,
        title: Option<String>,
        index: i64,
        duration_ms: Option<i64>,
        reason: TransitionReason,
    },
    IsPlayingChanged(bool),
    PlaybackStateChanged(PlaybackState),
    PositionDiscontinuity {
        old_ms: i64,
        new_ms: i64,
        reason: DiscontinuityReason,
    },
    Error {
        code: String,
        message: String,
    },
}

/// Channel the engine pushes its callbacks into.
pub type EngineEventSender = mpsc::UnboundedSender<EngineEvent>;

/// Opaque credential identifying the session the engine should bind to.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct ConnectionToken(String);

impl ConnectionToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ConnectionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ConnectionToken([REDACTED])")
    }
}

/// One entry of the queue handed to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineQueueEntry {
    /// Stable media id, see `TrackRef::key`.
    pub media_id: String,
    pub url: String,
    pub title: String,
    pub duration_ms: Option<u64>,
}

/// A live connection returned by [`EngineConnector::connect`].
pub struct EngineConnection {
    pub session: Box<dyn EngineSession>,
    /// Resolves with a reason when the engine unbinds or crashes.
    pub disconnected: oneshot::Receiver<String>,
}

impl std::fmt::Debug for EngineConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConnection").finish_non_exhaustive()
    }
}

/// Establishes engine connections.
#[async_trait]
pub trait EngineConnector: Send + Sync {
    /// Bind to the engine. Events for this connection are sent on `events`.
    async fn connect(
        &self,
        token: &ConnectionToken,
        events: EngineEventSender,
    ) -> Result<EngineConnection>;
}

/// Live engine handle with single-context affinity.
///
/// Methods return `BridgeError::EngineDisconnected` when the connection is
/// gone and any other error when a single call is rejected.
pub trait EngineSession: Send {
    fn set_queue(
        &mut self,
        entries: Vec<EngineQueueEntry>,
        start_index: usize,
        start_position_ms: u64,
    ) -> Result<()>;

    fn play(&mut self) -> Result<()>;

    fn pause(&mut self) -> Result<()>;

    fn stop(&mut self) -> Result<()>;

    /// Seek within the current item, or to `index` when given.
    fn seek_to(&mut self, index: Option<usize>, position_ms: u64) -> Result<()>;

    fn skip_next(&mut self) -> Result<()>;

    fn skip_previous(&mut self) -> Result<()>;

    fn set_repeat_mode(&mut self, mode: RepeatMode) -> Result<()>;

    fn set_shuffle(&mut self, enabled: bool) -> Result<()>;

    /// Index of the current item; negative when nothing is current.
    fn current_index(&mut self) -> Result<i64>;

    /// Position in the current item; may be negative while unset.
    fn position_ms(&mut self) -> Result<i64>;

    /// Duration of the current item; negative or `None` until known.
    fn duration_ms(&mut self) -> Result<Option<i64>>;

    /// Release engine resources. Called once when the coordinator drops the
    /// connection.
    fn release(&mut self) {}
}
