//! # Playback Error Types
//!
//! Error taxonomy for the session coordinator. Connection and command errors
//! travel through the snapshot's `last_error`; resolution and storage errors
//! are logged and swallowed by the component that hit them.

use std::time::Duration;

use bridge_traits::{BridgeError, TrackRef};
use thiserror::Error;

use crate::command::CommandKind;

/// Engine connection failures.
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// The connector returned an error.
    #[error("Engine connection failed: {0}")]
    ConnectFailed(String),

    /// A single attempt did not finish in time.
    #[error("Engine connection attempt timed out after {0:?}")]
    Timeout(Duration),

    /// An established connection went away.
    #[error("Engine connection lost: {0}")]
    Lost(String),

    /// The coordinator has been released.
    #[error("Engine connection released")]
    Released,
}

/// Failures of a single submitted command.
#[derive(Error, Debug)]
pub enum CommandError {
    /// The engine call itself failed.
    #[error("{command} rejected by engine: {source}")]
    Rejected {
        command: CommandKind,
        #[source]
        source: BridgeError,
    },

    /// `PlayTrackImmediate` named a track the engine queue does not hold.
    #[error("Track {0} is not in the engine queue")]
    NotInQueue(TrackRef),

    /// Reading the engine position failed.
    #[error("Engine position query failed: {0}")]
    Query(#[source] BridgeError),

    /// The operation needs a live connection.
    #[error("Engine not connected")]
    NotConnected,

    /// The command was dropped from a full pending buffer.
    #[error("{0} evicted from the pending command buffer")]
    Evicted(CommandKind),

    /// The coordinator shut down before the command ran.
    #[error("Command coordinator closed")]
    Closed,
}

impl CommandError {
    /// Whether the failure means the connection itself is gone.
    pub fn is_disconnect(&self) -> bool {
        match self {
            CommandError::Rejected { source, .. } | CommandError::Query(source) => {
                source.is_disconnect()
            }
            _ => false,
        }
    }
}

/// A queue item whose playable URL could not be produced.
#[derive(Error, Debug)]
#[error("Could not resolve a playable URL for {track}: {source}")]
pub struct ResolutionError {
    pub track: TrackRef,
    #[source]
    pub source: BridgeError,
}

/// A history or settings write/read that failed.
#[derive(Error, Debug)]
#[error("History storage {operation} failed: {source}")]
pub struct StorageError {
    pub operation: &'static str,
    #[source]
    pub source: BridgeError,
}

/// Errors surfaced by the playback session core.
#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The catalog could not list a recording.
    #[error("Catalog lookup for recording {recording_id} failed: {source}")]
    Catalog {
        recording_id: String,
        #[source]
        source: BridgeError,
    },

    /// The recording exists but does not contain the track.
    #[error("Track {0} not found in its recording")]
    TrackNotInRecording(TrackRef),

    /// Invalid playback configuration.
    #[error("Invalid playback configuration: {0}")]
    Config(String),
}

impl PlaybackError {
    /// Returns `true` if retrying later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PlaybackError::Connection(_)
                | PlaybackError::Command(CommandError::NotConnected)
                | PlaybackError::Command(CommandError::Evicted(_))
        ) || matches!(self, PlaybackError::Command(e) if e.is_disconnect())
    }
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnect_detection() {
        let err = CommandError::Rejected {
            command: CommandKind::Play,
            source: BridgeError::EngineDisconnected("binder died".into()),
        };
        assert!(err.is_disconnect());
        assert!(PlaybackError::from(err).is_transient());

        let err = CommandError::Rejected {
            command: CommandKind::SeekTo,
            source: BridgeError::OperationFailed("bad position".into()),
        };
        assert!(!err.is_disconnect());
        assert!(!PlaybackError::from(err).is_transient());
    }

    #[test]
    fn test_messages() {
        let err = PlaybackError::from(ConnectionError::Timeout(Duration::from_secs(10)));
        assert_eq!(
            err.to_string(),
            "Engine connection attempt timed out after 10s"
        );

        let err = CommandError::Evicted(CommandKind::Pause);
        assert_eq!(err.to_string(), "Pause evicted from the pending command buffer");
    }
}
