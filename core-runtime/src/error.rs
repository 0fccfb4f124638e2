//! Runtime errors raised while configuring the core.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// A configuration value is out of range or logging could not start.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A required bridge was not injected.
    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
