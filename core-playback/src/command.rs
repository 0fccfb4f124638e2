//! Transport and queue commands accepted by the coordinator.

use std::fmt;

use bridge_traits::{RepeatMode, TrackRef};

use crate::types::QueueItem;

/// A request to change playback.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Play,
    Pause,
    Stop,
    /// Seek within the current item, or jump to `index` first.
    SeekTo {
        position_ms: u64,
        index: Option<usize>,
    },
    SkipNext,
    SkipPrevious,
    SetRepeatMode(RepeatMode),
    SetShuffle(bool),
    LoadQueue(LoadQueueRequest),
    /// Jump to a track already in the engine queue and play it.
    PlayTrackImmediate(TrackRef),
}

/// Payload of [`Command::LoadQueue`]. Items are already resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadQueueRequest {
    pub items: Vec<QueueItem>,
    pub start_index: usize,
    pub start_position_ms: u64,
    pub auto_play: bool,
}

impl Command {
    pub fn seek_to(position_ms: u64) -> Self {
        Command::SeekTo {
            position_ms,
            index: None,
        }
    }

    pub fn seek_to_item(index: usize, position_ms: u64) -> Self {
        Command::SeekTo {
            position_ms,
            index: Some(index),
        }
    }

    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Play => CommandKind::Play,
            Command::Pause => CommandKind::Pause,
            Command::Stop => CommandKind::Stop,
            Command::SeekTo { .. } => CommandKind::SeekTo,
            Command::SkipNext => CommandKind::SkipNext,
            Command::SkipPrevious => CommandKind::SkipPrevious,
            Command::SetRepeatMode(_) => CommandKind::SetRepeatMode,
            Command::SetShuffle(_) => CommandKind::SetShuffle,
            Command::LoadQueue(_) => CommandKind::LoadQueue,
            Command::PlayTrackImmediate(_) => CommandKind::PlayTrackImmediate,
        }
    }
}

/// Payload-free command discriminant, used in logs and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Play,
    Pause,
    Stop,
    SeekTo,
    SkipNext,
    SkipPrevious,
    SetRepeatMode,
    SetShuffle,
    LoadQueue,
    PlayTrackImmediate,
}

impl CommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Play => "Play",
            CommandKind::Pause => "Pause",
            CommandKind::Stop => "Stop",
            CommandKind::SeekTo => "SeekTo",
            CommandKind::SkipNext => "SkipNext",
            CommandKind::SkipPrevious => "SkipPrevious",
            CommandKind::SetRepeatMode => "SetRepeatMode",
            CommandKind::SetShuffle => "SetShuffle",
            CommandKind::LoadQueue => "LoadQueue",
            CommandKind::PlayTrackImmediate => "PlayTrackImmediate",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_and_display() {
        assert_eq!(Command::seek_to(1_000).kind(), CommandKind::SeekTo);
        assert_eq!(
            Command::seek_to_item(2, 0),
            Command::SeekTo {
                position_ms: 0,
                index: Some(2)
            }
        );
        assert_eq!(
            Command::PlayTrackImmediate(TrackRef::new("r", "t")).kind().to_string(),
            "PlayTrackImmediate"
        );
    }
}
