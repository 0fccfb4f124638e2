//! # Playback Configuration
//!
//! Tunables for the session coordinator plus the history and resume
//! policies. Every field has a serde default so a partial document
//! deserializes into a usable configuration.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Session coordinator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// How often position is sampled while playing.
    ///
    /// Default: 1 second.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: Duration,

    /// Commands buffered while the engine is not connected. The oldest
    /// command is evicted once the buffer is full.
    ///
    /// Default: 32.
    #[serde(default = "default_pending_command_capacity")]
    pub pending_command_capacity: usize,

    /// First reconnect delay; doubles per failed attempt.
    ///
    /// Default: 500 ms.
    #[serde(default = "default_reconnect_initial_delay")]
    pub reconnect_initial_delay: Duration,

    /// Upper bound for the reconnect delay.
    ///
    /// Default: 30 seconds.
    #[serde(default = "default_reconnect_max_delay")]
    pub reconnect_max_delay: Duration,

    /// Budget for a single connection attempt.
    ///
    /// Default: 10 seconds.
    #[serde(default = "default_connect_attempt_timeout")]
    pub connect_attempt_timeout: Duration,

    /// How long a resume waits for the engine to connect.
    ///
    /// Default: 10 seconds.
    #[serde(default = "default_resume_connect_timeout")]
    pub resume_connect_timeout: Duration,

    /// Minimum played time between progress writes of an open track play.
    ///
    /// Default: 15 seconds.
    #[serde(default = "default_history_checkpoint_interval")]
    pub history_checkpoint_interval: Duration,

    #[serde(default)]
    pub history: HistoryPolicy,

    #[serde(default)]
    pub resume: ResumePolicy,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            pending_command_capacity: default_pending_command_capacity(),
            reconnect_initial_delay: default_reconnect_initial_delay(),
            reconnect_max_delay: default_reconnect_max_delay(),
            connect_attempt_timeout: default_connect_attempt_timeout(),
            resume_connect_timeout: default_resume_connect_timeout(),
            history_checkpoint_interval: default_history_checkpoint_interval(),
            history: HistoryPolicy::default(),
            resume: ResumePolicy::default(),
        }
    }
}

impl PlaybackConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.poll_interval.is_zero() {
            return Err("poll_interval must be > 0".to_string());
        }

        if self.pending_command_capacity == 0 {
            return Err("pending_command_capacity must be > 0".to_string());
        }

        if self.reconnect_initial_delay.is_zero() {
            return Err("reconnect_initial_delay must be > 0".to_string());
        }

        if self.reconnect_max_delay < self.reconnect_initial_delay {
            return Err("reconnect_max_delay cannot be below reconnect_initial_delay".to_string());
        }

        if self.connect_attempt_timeout.is_zero() {
            return Err("connect_attempt_timeout must be > 0".to_string());
        }

        self.history.validate()?;
        self.resume.validate()?;

        Ok(())
    }
}

/// Rules deciding which track plays are worth keeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPolicy {
    /// Played time that always counts as a meaningful listen.
    #[serde(default = "default_min_played_ms")]
    pub min_played_ms: u64,

    /// Tracks shorter than this use `short_track_ratio` instead.
    #[serde(default = "default_short_track_ms")]
    pub short_track_ms: u64,

    /// Fraction of a short track that counts as a meaningful listen.
    #[serde(default = "default_short_track_ratio")]
    pub short_track_ratio: f64,

    /// Final position fraction at or above which a play is complete.
    #[serde(default = "default_completion_ratio")]
    pub completion_ratio: f64,
}

impl Default for HistoryPolicy {
    fn default() -> Self {
        Self {
            min_played_ms: default_min_played_ms(),
            short_track_ms: default_short_track_ms(),
            short_track_ratio: default_short_track_ratio(),
            completion_ratio: default_completion_ratio(),
        }
    }
}

impl HistoryPolicy {
    pub fn is_meaningful_listen(&self, played_ms: u64, duration_ms: Option<u64>) -> bool {
        if played_ms >= self.min_played_ms {
            return true;
        }
        match duration_ms {
            Some(duration) if duration > 0 && duration < self.short_track_ms => {
                played_ms as f64 / duration as f64 >= self.short_track_ratio
            }
            _ => false,
        }
    }

    pub fn is_completed(&self, final_position_ms: u64, duration_ms: Option<u64>) -> bool {
        match duration_ms {
            Some(duration) if duration > 0 => {
                final_position_ms as f64 / duration as f64 >= self.completion_ratio
            }
            _ => false,
        }
    }

    fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.short_track_ratio) {
            return Err("history.short_track_ratio must be between 0.0 and 1.0".to_string());
        }
        if !(0.0..=1.0).contains(&self.completion_ratio) {
            return Err("history.completion_ratio must be between 0.0 and 1.0".to_string());
        }
        Ok(())
    }
}

/// Rules deciding whether a past play can be resumed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumePolicy {
    /// Plays stopped earlier than this are not worth resuming.
    #[serde(default = "default_resume_min_position_ms")]
    pub min_position_ms: u64,

    /// Plays at or past this fraction are treated as finished.
    #[serde(default = "default_resume_max_ratio")]
    pub max_ratio: f64,

    /// Plays older than this are stale.
    #[serde(default = "default_resume_max_age")]
    pub max_age: Duration,
}

impl Default for ResumePolicy {
    fn default() -> Self {
        Self {
            min_position_ms: default_resume_min_position_ms(),
            max_ratio: default_resume_max_ratio(),
            max_age: default_resume_max_age(),
        }
    }
}

impl ResumePolicy {
    /// Whether a play with these facts may be offered for resumption.
    pub fn is_eligible(
        &self,
        position_ms: u64,
        duration_ms: Option<u64>,
        was_completed: bool,
        started_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> bool {
        if was_completed || position_ms < self.min_position_ms {
            return false;
        }
        if let Some(duration) = duration_ms.filter(|d| *d > 0) {
            if position_ms as f64 / duration as f64 >= self.max_ratio {
                return false;
            }
        }
        let age = now.signed_duration_since(started_at);
        match age.to_std() {
            Ok(age) => age <= self.max_age,
            // started_at in the future; clock skew, accept
            Err(_) => true,
        }
    }

    fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.max_ratio) {
            return Err("resume.max_ratio must be between 0.0 and 1.0".to_string());
        }
        Ok(())
    }
}

// ============================================================================
// Default Functions (for serde)
// ============================================================================

fn default_poll_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_pending_command_capacity() -> usize {
    32
}

fn default_reconnect_initial_delay() -> Duration {
    Duration::from_millis(500)
}

fn default_reconnect_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_connect_attempt_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_resume_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_history_checkpoint_interval() -> Duration {
    Duration::from_secs(15)
}

fn default_min_played_ms() -> u64 {
    30_000
}

fn default_short_track_ms() -> u64 {
    40_000
}

fn default_short_track_ratio() -> f64 {
    0.25
}

fn default_completion_ratio() -> f64 {
    0.9
}

fn default_resume_min_position_ms() -> u64 {
    30_000
}

fn default_resume_max_ratio() -> f64 {
    0.9
}

fn default_resume_max_age() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn test_defaults_validate() {
        let config = PlaybackConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pending_command_capacity, 32);
        assert_eq!(config.poll_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_partial_document_fills_defaults() {
        let config: PlaybackConfig =
            serde_json::from_str(r#"{"pending_command_capacity": 4}"#).unwrap();
        assert_eq!(config.pending_command_capacity, 4);
        assert_eq!(config.history, HistoryPolicy::default());
        assert_eq!(config.reconnect_max_delay, Duration::from_secs(30));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = PlaybackConfig {
            pending_command_capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = PlaybackConfig {
            reconnect_initial_delay: Duration::from_secs(5),
            reconnect_max_delay: Duration::from_secs(1),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let mut config = PlaybackConfig::default();
        config.history.completion_ratio = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_meaningful_listen() {
        let policy = HistoryPolicy::default();
        assert!(!policy.is_meaningful_listen(0, Some(180_000)));
        assert!(!policy.is_meaningful_listen(29_999, Some(180_000)));
        assert!(policy.is_meaningful_listen(30_000, Some(180_000)));
        assert!(policy.is_meaningful_listen(30_000, None));

        // Short track: a quarter is enough.
        assert!(policy.is_meaningful_listen(5_000, Some(20_000)));
        assert!(!policy.is_meaningful_listen(4_999, Some(20_000)));
        // 40 s is not short.
        assert!(!policy.is_meaningful_listen(10_000, Some(40_000)));
    }

    #[test]
    fn test_completion_ratio() {
        let policy = HistoryPolicy::default();
        assert!(policy.is_completed(180_000, Some(180_000)));
        assert!(policy.is_completed(162_000, Some(180_000)));
        assert!(!policy.is_completed(161_999, Some(180_000)));
        assert!(!policy.is_completed(180_000, None));
    }

    #[test]
    fn test_resume_eligibility() {
        let policy = ResumePolicy::default();
        let now = Utc::now();
        let recent = now - ChronoDuration::hours(1);

        assert!(policy.is_eligible(95_000, Some(240_000), false, recent, now));
        assert!(!policy.is_eligible(95_000, Some(240_000), true, recent, now));
        assert!(!policy.is_eligible(29_000, Some(240_000), false, recent, now));
        assert!(!policy.is_eligible(230_000, Some(240_000), false, recent, now));
        assert!(policy.is_eligible(95_000, None, false, recent, now));

        let stale = now - ChronoDuration::hours(25);
        assert!(!policy.is_eligible(95_000, Some(240_000), false, stale, now));
        let edge = now - ChronoDuration::hours(24);
        assert!(policy.is_eligible(95_000, Some(240_000), false, edge, now));
    }
}
