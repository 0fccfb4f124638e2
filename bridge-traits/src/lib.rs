//! # Host Bridge Traits
//!
//! Contracts between the playback session core and the collaborators it does
//! not own.
//!
//! ## Traits
//!
//! ### Playback engine
//! - [`EngineConnector`](playback::EngineConnector) - Binds to the engine
//! - [`EngineSession`](playback::EngineSession) - Live handle, single-context affinity
//! - [`EngineEvent`](playback::EngineEvent) - Raw engine callbacks
//!
//! ### Content
//! - [`PlayableUrlResolver`](content::PlayableUrlResolver) - Track to playable URL
//! - [`RecordingCatalog`](content::RecordingCatalog) - Tracks of a recording
//!
//! ### Storage
//! - [`HistoryStore`](history::HistoryStore) - Listening sessions and track plays
//! - [`SettingsStore`](storage::SettingsStore) - Key-value preferences storage
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Engine adapters
//! must report a lost connection as `BridgeError::EngineDisconnected` so the
//! core can tell it apart from a single rejected call.
//!
//! ## Thread Safety
//!
//! Every trait except [`EngineSession`](playback::EngineSession) requires
//! `Send + Sync` and is shared as `Arc<dyn Trait>`. The engine session is
//! `Send` only and is owned by exactly one task.

pub mod content;
pub mod error;
pub mod history;
pub mod media;
pub mod playback;
pub mod storage;
pub mod time;

pub use error::{BridgeError, Result};

// Re-export commonly used types
pub use content::{PlayableUrlResolver, RecordingCatalog};
pub use history::{HistoryStore, ListeningSession, TrackCompletion, TrackEndReason, TrackPlayRecord};
pub use media::{TrackInfo, TrackRef};
pub use playback::{
    ConnectionToken, DiscontinuityReason, EngineConnection, EngineConnector, EngineEvent,
    EngineEventSender, EngineQueueEntry, EngineSession, PlaybackState, RepeatMode,
    TransitionReason,
};
pub use storage::SettingsStore;
pub use time::{Clock, LogEntry, LogLevel, LoggerSink, ManualClock, SystemClock};
