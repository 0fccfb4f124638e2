//! # Resume Coordinator
//!
//! Finds the play most worth resuming and restores it: the recording is
//! reloaded as the queue, paused, at the saved position.

use std::sync::Arc;

use bridge_traits::{Clock, HistoryStore, SettingsStore, TrackRef};
use chrono::{DateTime, Utc};
use core_async::time::Duration;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::command::Command;
use crate::config::ResumePolicy;
use crate::coordinator::CommandCoordinator;
use crate::error::{PlaybackError, Result, StorageError};
use crate::last_played;
use crate::queue::QueueManager;

/// Where a resume candidate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResumeSource {
    History,
    LastPlayed,
}

/// A past play that may be resumed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeCandidate {
    pub track: TrackRef,
    pub title: String,
    pub position_ms: u64,
    pub duration_ms: Option<u64>,
    pub started_at: DateTime<Utc>,
    pub source: ResumeSource,
}

pub struct ResumeCoordinator {
    history: Arc<dyn HistoryStore>,
    settings: Arc<dyn SettingsStore>,
    clock: Arc<dyn Clock>,
    queue: QueueManager,
    coordinator: CommandCoordinator,
    policy: ResumePolicy,
    connect_timeout: Duration,
}

impl ResumeCoordinator {
    pub fn new(
        history: Arc<dyn HistoryStore>,
        settings: Arc<dyn SettingsStore>,
        clock: Arc<dyn Clock>,
        queue: QueueManager,
        coordinator: CommandCoordinator,
        policy: ResumePolicy,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            history,
            settings,
            clock,
            queue,
            coordinator,
            policy,
            connect_timeout,
        }
    }

    /// Most recent eligible play, from history first and the last-played
    /// record second. Storage errors are logged and yield `None`.
    pub async fn find_resume_candidate(&self) -> Option<ResumeCandidate> {
        let now = self.clock.now();

        match self.history.get_last_incomplete_track().await {
            Ok(Some(record)) => {
                let position = record.final_position_ms.unwrap_or(0);
                let was_completed = record.was_completed.unwrap_or(false);
                if self.policy.is_eligible(
                    position,
                    record.duration_ms,
                    was_completed,
                    record.started_at,
                    now,
                ) {
                    debug!(track = %record.track, position_ms = position, "Resume candidate from history");
                    return Some(ResumeCandidate {
                        track: record.track,
                        title: record.title,
                        position_ms: position,
                        duration_ms: record.duration_ms,
                        started_at: record.started_at,
                        source: ResumeSource::History,
                    });
                }
                debug!(track = %record.track, "Last incomplete play not eligible for resume");
                return None;
            }
            Ok(None) => {}
            Err(source) => {
                let err = StorageError {
                    operation: "get_last_incomplete_track",
                    source,
                };
                warn!(error = %err, "Could not read history for resume");
            }
        }

        match last_played::load(self.settings.as_ref()).await {
            Ok(Some(record)) => {
                if self.policy.is_eligible(
                    record.position_ms,
                    record.duration_ms,
                    record.was_completed,
                    record.started_at,
                    now,
                ) {
                    debug!(track = %record.track, "Resume candidate from last-played record");
                    return Some(ResumeCandidate {
                        track: record.track,
                        title: record.title,
                        position_ms: record.position_ms,
                        duration_ms: record.duration_ms,
                        started_at: record.started_at,
                        source: ResumeSource::LastPlayed,
                    });
                }
                None
            }
            Ok(None) => None,
            Err(source) => {
                let err = StorageError {
                    operation: "load_last_played",
                    source,
                };
                warn!(error = %err, "Could not read last-played record");
                None
            }
        }
    }

    /// Restore `candidate` paused at its saved position.
    ///
    /// Waits for the engine connection first; if the wait times out the
    /// resume fails without side effects.
    #[instrument(skip_all, fields(track = %candidate.track, position_ms = candidate.position_ms))]
    pub async fn resume(&self, candidate: &ResumeCandidate) -> Result<()> {
        self.coordinator.wait_connected(self.connect_timeout).await?;

        let recording_id = &candidate.track.recording_id;
        let tracks = self.queue.collection(recording_id).await?;
        let index = tracks
            .iter()
            .position(|info| info.track == candidate.track)
            .ok_or_else(|| PlaybackError::TrackNotInRecording(candidate.track.clone()))?;

        self.queue
            .load_exact(tracks, index, candidate.position_ms)
            .await?;
        self.coordinator
            .submit(Command::seek_to(candidate.position_ms))
            .await?;

        info!("Playback resumed");
        Ok(())
    }
}
