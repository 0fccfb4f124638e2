//! Snapshot, queue and report types shared by the session components.

use bridge_traits::{PlaybackState, TrackRef};
use serde::{Deserialize, Serialize};

/// Engine connection lifecycle as seen by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

/// The track the engine reports as current.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentTrack {
    pub track: TrackRef,
    pub title: Option<String>,
}

impl CurrentTrack {
    pub fn recording_id(&self) -> &str {
        &self.track.recording_id
    }
}

/// Where an error surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorSource {
    Engine,
    Connection,
    Command,
}

/// Error shown to the UI through the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDescriptor {
    pub source: ErrorSource,
    pub code: String,
    pub message: String,
}

impl ErrorDescriptor {
    pub fn new(source: ErrorSource, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            source,
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Point-in-time playback view. Replaced wholesale on every change.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlaybackSnapshot {
    pub connection_state: ConnectionState,
    pub playback_state: PlaybackState,
    pub is_playing: bool,
    pub current_track: Option<CurrentTrack>,
    pub position_ms: u64,
    pub duration_ms: Option<u64>,
    pub last_error: Option<ErrorDescriptor>,
}

/// A resolved, engine-ready queue entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItem {
    pub track: TrackRef,
    pub title: String,
    pub source_url: String,
    pub duration_ms: Option<u64>,
}

/// Ordered play queue with a current position.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Queue {
    pub items: Vec<QueueItem>,
    /// `None` when nothing is current.
    pub current_index: Option<usize>,
}

impl Queue {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn current(&self) -> Option<&QueueItem> {
        self.current_index.and_then(|i| self.items.get(i))
    }

    pub fn position_of(&self, track: &TrackRef) -> Option<usize> {
        self.items.iter().position(|item| item.track == *track)
    }

    /// Clamp an engine-reported index into `[0, len)`.
    ///
    /// Negative indices mean "nothing current" and map to `None`.
    pub fn clamp_index(&self, raw: i64) -> Option<usize> {
        if self.items.is_empty() || raw < 0 {
            return None;
        }
        let last = self.items.len() - 1;
        Some((raw as u64).min(last as u64) as usize)
    }

    /// Resolve the current index from an engine transition.
    ///
    /// The clamped index wins when it points at the reported track; a track
    /// found elsewhere in the queue wins over a mismatching index.
    pub fn index_for_transition(&self, track: Option<&TrackRef>, raw: i64) -> Option<usize> {
        let clamped = self.clamp_index(raw);
        match track {
            Some(track) => {
                let matches = clamped
                    .and_then(|i| self.items.get(i))
                    .map(|item| item.track == *track)
                    .unwrap_or(false);
                if matches {
                    clamped
                } else {
                    self.position_of(track).or(clamped)
                }
            }
            None => clamped,
        }
    }
}

/// Engine position read back after a command or on a poll tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PositionReport {
    pub index: Option<usize>,
    pub position_ms: u64,
    pub duration_ms: Option<u64>,
}

impl PositionReport {
    /// Build a report from raw engine values, clamping sentinels.
    pub fn from_engine(index: i64, position_ms: i64, duration_ms: Option<i64>) -> Self {
        Self {
            index: usize::try_from(index).ok(),
            position_ms: position_ms.max(0) as u64,
            duration_ms: duration_ms.filter(|d| *d > 0).map(|d| d as u64),
        }
    }
}
