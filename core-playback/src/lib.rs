//! # Playback Session Core
//!
//! Coordinates a media-playback session between the UI and an external
//! playback engine.
//!
//! ## Overview
//!
//! - [`CommandCoordinator`] owns the engine connection, buffers commands
//!   while disconnected and reconnects with exponential backoff.
//! - [`EventTracker`] normalizes engine callbacks, derives session
//!   boundaries and fans events out in arrival order.
//! - [`SessionState`] holds the authoritative [`PlaybackSnapshot`] and polls
//!   the position while playing.
//! - [`QueueManager`] resolves and loads play queues.
//! - [`HistorySessionManager`] records listening sessions and track plays.
//! - [`ResumeCoordinator`] restores the most recent unfinished play.
//!
//! ## Data flow
//!
//! ```text
//! UI ──Command──▶ CommandCoordinator ──▶ engine
//!                        │ reports          │ callbacks
//!                        ▼                  ▼
//!                   EventTracker ──▶ SessionState ──▶ snapshot watchers
//!                        │
//!                        ├──▶ QueueManager (current index)
//!                        └──▶ HistorySessionManager ──▶ HistoryStore
//! ```

pub mod command;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod history;
pub mod last_played;
pub mod queue;
pub mod resume;
pub mod session_state;
pub mod tracker;
pub mod types;

pub use command::{Command, CommandKind, LoadQueueRequest};
pub use config::{HistoryPolicy, PlaybackConfig, ResumePolicy};
pub use coordinator::{CommandCoordinator, CoordinatorSettings};
pub use error::{
    CommandError, ConnectionError, PlaybackError, ResolutionError, Result, StorageError,
};
pub use events::{PlaybackEvent, TrackedEvent};
pub use history::{HistoryRecorder, HistorySessionManager};
pub use last_played::{LastPlayed, LAST_PLAYED_KEY};
pub use queue::QueueManager;
pub use resume::{ResumeCandidate, ResumeCoordinator, ResumeSource};
pub use session_state::{PositionProbe, SessionState, SessionStateView};
pub use tracker::{EventTracker, TrackerHandle};
pub use types::{
    ConnectionState, CurrentTrack, ErrorDescriptor, ErrorSource, PlaybackSnapshot,
    PositionReport, Queue, QueueItem,
};
