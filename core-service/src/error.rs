use bridge_traits::BridgeError;
use core_playback::{CommandError, ConnectionError, PlaybackError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Core initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Invalid playback configuration: {0}")]
    Config(String),

    #[error("Runtime error: {0}")]
    Runtime(#[from] core_runtime::Error),

    #[error("Playback error: {0}")]
    Playback(#[from] PlaybackError),

    #[error("Storage error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Service has been released")]
    Released,
}

impl From<CommandError> for CoreError {
    fn from(err: CommandError) -> Self {
        CoreError::Playback(err.into())
    }
}

impl From<ConnectionError> for CoreError {
    fn from(err: ConnectionError) -> Self {
        CoreError::Playback(err.into())
    }
}

impl CoreError {
    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            CoreError::Playback(e) => e.is_transient(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
