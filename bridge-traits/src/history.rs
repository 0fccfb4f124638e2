//! Listening history storage.
//!
//! Rows written here are owned by the store once inserted. The core only
//! inserts, updates and reads them back; it never holds a connection open.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{BridgeError, Result};
use crate::media::TrackRef;

/// A contiguous span of active playback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListeningSession {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// How a track stopped being current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackEndReason {
    /// Played to the end and the engine advanced.
    AutoAdvance,
    /// User skipped or seeked to another item.
    Seek,
    /// Same item restarted by repeat.
    Repeat,
    /// The queue was replaced.
    QueueReplaced,
    /// Session ended (stop, end of queue, connection loss).
    SessionEnded,
    /// Engine reported an error.
    Error,
    /// History manager was stopped.
    Shutdown,
}

impl TrackEndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackEndReason::AutoAdvance => "auto_advance",
            TrackEndReason::Seek => "seek",
            TrackEndReason::Repeat => "repeat",
            TrackEndReason::QueueReplaced => "queue_replaced",
            TrackEndReason::SessionEnded => "session_ended",
            TrackEndReason::Error => "error",
            TrackEndReason::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for TrackEndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrackEndReason {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "auto_advance" => Ok(TrackEndReason::AutoAdvance),
            "seek" => Ok(TrackEndReason::Seek),
            "repeat" => Ok(TrackEndReason::Repeat),
            "queue_replaced" => Ok(TrackEndReason::QueueReplaced),
            "session_ended" => Ok(TrackEndReason::SessionEnded),
            "error" => Ok(TrackEndReason::Error),
            "shutdown" => Ok(TrackEndReason::Shutdown),
            other => Err(BridgeError::OperationFailed(format!(
                "Unknown track end reason: {}",
                other
            ))),
        }
    }
}

/// One persisted row of track history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackPlayRecord {
    /// Store-assigned id, `None` before insertion.
    pub id: Option<i64>,
    pub track: TrackRef,
    pub title: String,
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: Option<u64>,
    pub completed_at: Option<DateTime<Utc>>,
    pub final_position_ms: Option<u64>,
    pub played_duration_ms: Option<u64>,
    pub was_completed: Option<bool>,
    pub transition_reason: Option<TrackEndReason>,
}

impl TrackPlayRecord {
    pub fn recording_id(&self) -> &str {
        &self.track.recording_id
    }

    /// Fill in the closing fields.
    pub fn apply_completion(&mut self, completion: &TrackCompletion) {
        self.completed_at = Some(completion.completed_at);
        self.final_position_ms = Some(completion.final_position_ms);
        self.played_duration_ms = Some(completion.played_duration_ms);
        self.was_completed = Some(completion.was_completed);
        self.transition_reason = Some(completion.reason);
        if completion.duration_ms.is_some() {
            self.duration_ms = completion.duration_ms;
        }
    }
}

/// Closing fields of a [`TrackPlayRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackCompletion {
    pub completed_at: DateTime<Utc>,
    pub final_position_ms: u64,
    pub played_duration_ms: u64,
    pub duration_ms: Option<u64>,
    pub was_completed: bool,
    pub reason: TrackEndReason,
}

/// History persistence.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Persist a newly opened listening session.
    async fn start_session(&self, session: &ListeningSession) -> Result<()>;

    /// Mark a session as ended.
    async fn complete_session(&self, session_id: &str, ended_at: DateTime<Utc>) -> Result<()>;

    /// Insert a track play and return its id.
    async fn insert_track_play(&self, record: &TrackPlayRecord) -> Result<i64>;

    /// Record progress of a still-open track play.
    async fn update_track_play_progress(
        &self,
        id: i64,
        final_position_ms: u64,
        played_duration_ms: u64,
    ) -> Result<()>;

    /// Close a track play.
    async fn update_track_play_completion(&self, id: i64, completion: &TrackCompletion)
        -> Result<()>;

    /// Most recent track play that was not completed.
    async fn get_last_incomplete_track(&self) -> Result<Option<TrackPlayRecord>>;

    /// Most recent track plays, newest first.
    async fn recent_track_plays(&self, limit: u32) -> Result<Vec<TrackPlayRecord>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_reason_round_trip() {
        for reason in [
            TrackEndReason::AutoAdvance,
            TrackEndReason::Seek,
            TrackEndReason::Repeat,
            TrackEndReason::QueueReplaced,
            TrackEndReason::SessionEnded,
            TrackEndReason::Error,
            TrackEndReason::Shutdown,
        ] {
            assert_eq!(reason.as_str().parse::<TrackEndReason>().unwrap(), reason);
        }
        assert!("bogus".parse::<TrackEndReason>().is_err());
    }

    #[test]
    fn test_apply_completion_keeps_known_duration() {
        let mut record = TrackPlayRecord {
            id: Some(1),
            track: TrackRef::new("rec", "t1"),
            title: "Scarlet Begonias".into(),
            session_id: "s".into(),
            started_at: Utc::now(),
            duration_ms: Some(40_000),
            completed_at: None,
            final_position_ms: None,
            played_duration_ms: None,
            was_completed: None,
            transition_reason: None,
        };

        record.apply_completion(&TrackCompletion {
            completed_at: Utc::now(),
            final_position_ms: 35_000,
            played_duration_ms: 35_000,
            duration_ms: None,
            was_completed: false,
            reason: TrackEndReason::SessionEnded,
        });

        assert_eq!(record.duration_ms, Some(40_000));
        assert_eq!(record.was_completed, Some(false));
        assert_eq!(record.recording_id(), "rec");
    }
}
