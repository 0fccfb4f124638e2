//! Lightweight "last played" record kept in the settings store.
//!
//! History rows are the primary source for resuming; this record is the
//! fallback for hosts whose history store was cleared or never written.

use bridge_traits::{BridgeError, SettingsStore, TrackRef};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Settings key holding the JSON-encoded [`LastPlayed`].
pub const LAST_PLAYED_KEY: &str = "playback.last_played";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastPlayed {
    pub track: TrackRef,
    pub title: String,
    pub position_ms: u64,
    pub duration_ms: Option<u64>,
    pub was_completed: bool,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub async fn save(store: &dyn SettingsStore, record: &LastPlayed) -> Result<(), BridgeError> {
    let json = serde_json::to_string(record)?;
    store.set_string(LAST_PLAYED_KEY, &json).await
}

/// Load the record. A value that no longer parses is treated as absent.
pub async fn load(store: &dyn SettingsStore) -> Result<Option<LastPlayed>, BridgeError> {
    let Some(json) = store.get_string(LAST_PLAYED_KEY).await? else {
        return Ok(None);
    };
    match serde_json::from_str(&json) {
        Ok(record) => Ok(Some(record)),
        Err(e) => {
            tracing::warn!(error = %e, "Discarding unreadable last-played record");
            Ok(None)
        }
    }
}
