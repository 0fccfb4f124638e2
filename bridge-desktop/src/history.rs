//! Listening history in SQLite.

use std::path::PathBuf;

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    history::{HistoryStore, ListeningSession, TrackCompletion, TrackEndReason, TrackPlayRecord},
    media::TrackRef,
};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use tracing::{debug, instrument};

use crate::db::{self, db_error};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS listening_sessions (
        session_id TEXT PRIMARY KEY,
        started_at INTEGER NOT NULL,
        ended_at INTEGER
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS track_plays (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id TEXT NOT NULL,
        recording_id TEXT NOT NULL,
        track_id TEXT NOT NULL,
        title TEXT NOT NULL,
        started_at INTEGER NOT NULL,
        duration_ms INTEGER,
        completed_at INTEGER,
        final_position_ms INTEGER,
        played_duration_ms INTEGER,
        was_completed INTEGER,
        transition_reason TEXT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_track_plays_started_at ON track_plays (started_at)",
];

const SELECT_PLAY: &str = r#"
    SELECT id, session_id, recording_id, track_id, title, started_at, duration_ms,
           completed_at, final_position_ms, played_duration_ms, was_completed,
           transition_reason
    FROM track_plays
"#;

/// SQLite-backed [`HistoryStore`].
///
/// Timestamps are stored as Unix milliseconds.
pub struct SqliteHistoryStore {
    pool: SqlitePool,
}

impl SqliteHistoryStore {
    /// Open the store in the database file at `db_path`.
    pub async fn new(db_path: PathBuf) -> Result<Self> {
        let pool = db::open(&db_path).await?;
        db::execute_schema(&pool, SCHEMA).await?;
        debug!(path = ?db_path, "Initialized history store");
        Ok(Self { pool })
    }

    /// Create an in-memory history store (for testing)
    pub async fn in_memory() -> Result<Self> {
        let pool = db::open_in_memory().await?;
        db::execute_schema(&pool, SCHEMA).await?;
        Ok(Self { pool })
    }
}

fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| BridgeError::DatabaseError(format!("Invalid timestamp: {}", ms)))
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn to_u64(value: Option<i64>) -> Option<u64> {
    value.map(|v| v.max(0) as u64)
}

fn play_from_row(row: &SqliteRow) -> Result<TrackPlayRecord> {
    let get = |e: sqlx::Error| db_error("Failed to decode track play", e);

    let completed_at: Option<i64> = row.try_get("completed_at").map_err(get)?;
    let was_completed: Option<i64> = row.try_get("was_completed").map_err(get)?;
    let reason: Option<String> = row.try_get("transition_reason").map_err(get)?;

    Ok(TrackPlayRecord {
        id: Some(row.try_get("id").map_err(get)?),
        track: TrackRef::new(
            row.try_get::<String, _>("recording_id").map_err(get)?,
            row.try_get::<String, _>("track_id").map_err(get)?,
        ),
        title: row.try_get("title").map_err(get)?,
        session_id: row.try_get("session_id").map_err(get)?,
        started_at: from_millis(row.try_get("started_at").map_err(get)?)?,
        duration_ms: to_u64(row.try_get("duration_ms").map_err(get)?),
        completed_at: completed_at.map(from_millis).transpose()?,
        final_position_ms: to_u64(row.try_get("final_position_ms").map_err(get)?),
        played_duration_ms: to_u64(row.try_get("played_duration_ms").map_err(get)?),
        was_completed: was_completed.map(|v| v != 0),
        transition_reason: reason
            .map(|r| r.parse::<TrackEndReason>())
            .transpose()?,
    })
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    #[instrument(skip_all, fields(session_id = %session.session_id))]
    async fn start_session(&self, session: &ListeningSession) -> Result<()> {
        sqlx::query(
            "INSERT INTO listening_sessions (session_id, started_at, ended_at) VALUES (?, ?, ?)",
        )
        .bind(&session.session_id)
        .bind(to_millis(session.started_at))
        .bind(session.ended_at.map(to_millis))
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to start session", e))?;
        Ok(())
    }

    #[instrument(skip(self, ended_at))]
    async fn complete_session(&self, session_id: &str, ended_at: DateTime<Utc>) -> Result<()> {
        let result = sqlx::query("UPDATE listening_sessions SET ended_at = ? WHERE session_id = ?")
            .bind(to_millis(ended_at))
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Failed to complete session", e))?;

        if result.rows_affected() == 0 {
            return Err(BridgeError::NotFound(format!("session {}", session_id)));
        }
        Ok(())
    }

    #[instrument(skip_all, fields(track = %record.track))]
    async fn insert_track_play(&self, record: &TrackPlayRecord) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO track_plays (
                session_id, recording_id, track_id, title, started_at, duration_ms,
                completed_at, final_position_ms, played_duration_ms, was_completed,
                transition_reason
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.session_id)
        .bind(&record.track.recording_id)
        .bind(&record.track.track_id)
        .bind(&record.title)
        .bind(to_millis(record.started_at))
        .bind(record.duration_ms.map(to_i64))
        .bind(record.completed_at.map(to_millis))
        .bind(record.final_position_ms.map(to_i64))
        .bind(record.played_duration_ms.map(to_i64))
        .bind(record.was_completed)
        .bind(record.transition_reason.map(|r| r.as_str()))
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to insert track play", e))?;

        let id = result.last_insert_rowid();
        debug!(id, "Inserted track play");
        Ok(id)
    }

    async fn update_track_play_progress(
        &self,
        id: i64,
        final_position_ms: u64,
        played_duration_ms: u64,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE track_plays SET final_position_ms = ?, played_duration_ms = ? WHERE id = ?",
        )
        .bind(to_i64(final_position_ms))
        .bind(to_i64(played_duration_ms))
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to update track play progress", e))?;

        if result.rows_affected() == 0 {
            return Err(BridgeError::NotFound(format!("track play {}", id)));
        }
        Ok(())
    }

    #[instrument(skip(self, completion), fields(reason = %completion.reason))]
    async fn update_track_play_completion(
        &self,
        id: i64,
        completion: &TrackCompletion,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE track_plays SET
                completed_at = ?,
                final_position_ms = ?,
                played_duration_ms = ?,
                duration_ms = COALESCE(?, duration_ms),
                was_completed = ?,
                transition_reason = ?
            WHERE id = ?
            "#,
        )
        .bind(to_millis(completion.completed_at))
        .bind(to_i64(completion.final_position_ms))
        .bind(to_i64(completion.played_duration_ms))
        .bind(completion.duration_ms.map(to_i64))
        .bind(completion.was_completed)
        .bind(completion.reason.as_str())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to complete track play", e))?;

        if result.rows_affected() == 0 {
            return Err(BridgeError::NotFound(format!("track play {}", id)));
        }
        Ok(())
    }

    async fn get_last_incomplete_track(&self) -> Result<Option<TrackPlayRecord>> {
        let query = format!(
            "{} WHERE was_completed IS NOT 1 ORDER BY started_at DESC, id DESC LIMIT 1",
            SELECT_PLAY
        );
        let row = sqlx::query(&query)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to query last incomplete track", e))?;

        row.as_ref().map(play_from_row).transpose()
    }

    async fn recent_track_plays(&self, limit: u32) -> Result<Vec<TrackPlayRecord>> {
        let query = format!("{} ORDER BY started_at DESC, id DESC LIMIT ?", SELECT_PLAY);
        let rows = sqlx::query(&query)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("Failed to query recent track plays", e))?;

        rows.iter().map(play_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 20, minute, 0).unwrap()
    }

    fn record(track_id: &str, started_at: DateTime<Utc>) -> TrackPlayRecord {
        TrackPlayRecord {
            id: None,
            track: TrackRef::new("gd1977-05-08", track_id),
            title: format!("Track {}", track_id),
            session_id: "s-1".into(),
            started_at,
            duration_ms: Some(300_000),
            completed_at: None,
            final_position_ms: Some(45_000),
            played_duration_ms: Some(45_000),
            was_completed: None,
            transition_reason: None,
        }
    }

    async fn store_with_session() -> SqliteHistoryStore {
        let store = SqliteHistoryStore::in_memory().await.unwrap();
        store
            .start_session(&ListeningSession {
                session_id: "s-1".into(),
                started_at: at(0),
                ended_at: None,
            })
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_insert_and_read_back() {
        let store = store_with_session().await;

        let id = store.insert_track_play(&record("t1", at(1))).await.unwrap();
        let plays = store.recent_track_plays(10).await.unwrap();

        assert_eq!(plays.len(), 1);
        let mut expected = record("t1", at(1));
        expected.id = Some(id);
        assert_eq!(plays[0], expected);
    }

    #[tokio::test]
    async fn test_progress_and_completion_updates() {
        let store = store_with_session().await;
        let id = store.insert_track_play(&record("t1", at(1))).await.unwrap();

        store
            .update_track_play_progress(id, 120_000, 118_000)
            .await
            .unwrap();
        let open = store.get_last_incomplete_track().await.unwrap().unwrap();
        assert_eq!(open.final_position_ms, Some(120_000));
        assert_eq!(open.played_duration_ms, Some(118_000));

        store
            .update_track_play_completion(
                id,
                &TrackCompletion {
                    completed_at: at(6),
                    final_position_ms: 300_000,
                    played_duration_ms: 298_000,
                    duration_ms: None,
                    was_completed: true,
                    reason: TrackEndReason::AutoAdvance,
                },
            )
            .await
            .unwrap();

        assert!(store.get_last_incomplete_track().await.unwrap().is_none());
        let done = &store.recent_track_plays(1).await.unwrap()[0];
        assert_eq!(done.was_completed, Some(true));
        assert_eq!(done.transition_reason, Some(TrackEndReason::AutoAdvance));
        assert_eq!(done.duration_ms, Some(300_000));
        assert_eq!(done.completed_at, Some(at(6)));
    }

    #[tokio::test]
    async fn test_last_incomplete_is_most_recent() {
        let store = store_with_session().await;
        store.insert_track_play(&record("t1", at(1))).await.unwrap();
        store.insert_track_play(&record("t2", at(7))).await.unwrap();
        let mut finished = record("t3", at(3));
        finished.was_completed = Some(true);
        store.insert_track_play(&finished).await.unwrap();

        let last = store.get_last_incomplete_track().await.unwrap().unwrap();
        assert_eq!(last.track.track_id, "t2");

        let recent = store.recent_track_plays(2).await.unwrap();
        let ids: Vec<_> = recent.iter().map(|p| p.track.track_id.as_str()).collect();
        assert_eq!(ids, vec!["t2", "t3"]);
    }

    #[tokio::test]
    async fn test_complete_session() {
        let store = store_with_session().await;
        store
            .complete_session("s-1", at(0) + Duration::minutes(30))
            .await
            .unwrap();

        let err = store.complete_session("missing", at(1)).await;
        assert!(matches!(err, Err(BridgeError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_updates_on_unknown_row_fail() {
        let store = store_with_session().await;
        assert!(store.update_track_play_progress(99, 1, 1).await.is_err());
    }
}
