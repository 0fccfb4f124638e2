use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("Engine disconnected: {0}")]
    EngineDisconnected(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Whether the error means the engine connection itself is gone, as
    /// opposed to a single call being rejected.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, BridgeError::EngineDisconnected(_))
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
