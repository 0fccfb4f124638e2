//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the playback session core:
//! - Logging and tracing infrastructure
//! - Configuration management (injected collaborators)
//! - Diagnostic event bus
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that the session components
//! depend on. It establishes the logging conventions and event broadcasting
//! mechanisms used throughout the system.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
