//! Track identity and display metadata shared by every bridge.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identity of one logical track: the recording (show/collection) it
/// belongs to plus the track id inside that recording.
///
/// Two `TrackRef`s are equal whenever they name the same logical track, no
/// matter which URL (local file or stream) it was resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackRef {
    pub recording_id: String,
    pub track_id: String,
}

const KEY_SEPARATOR: char = '#';

impl TrackRef {
    pub fn new(recording_id: impl Into<String>, track_id: impl Into<String>) -> Self {
        Self {
            recording_id: recording_id.into(),
            track_id: track_id.into(),
        }
    }

    /// Composite key used as the engine media id.
    pub fn key(&self) -> String {
        format!("{}{}{}", self.recording_id, KEY_SEPARATOR, self.track_id)
    }

    /// Parse a key produced by [`TrackRef::key`].
    pub fn from_key(key: &str) -> Option<Self> {
        let (recording_id, track_id) = key.rsplit_once(KEY_SEPARATOR)?;
        if recording_id.is_empty() || track_id.is_empty() {
            return None;
        }
        Some(Self::new(recording_id, track_id))
    }
}

impl fmt::Display for TrackRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.recording_id, KEY_SEPARATOR, self.track_id)
    }
}

/// A track as listed by the catalog, before URL resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackInfo {
    pub track: TrackRef,
    pub title: String,
    /// Catalog duration, when known. The engine's value wins once Ready.
    pub duration_ms: Option<u64>,
}

impl TrackInfo {
    pub fn new(track: TrackRef, title: impl Into<String>) -> Self {
        Self {
            track,
            title: title.into(),
            duration_ms: None,
        }
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}
