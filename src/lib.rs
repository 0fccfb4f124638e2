//! Workspace placeholder crate.
//!
//! This crate exists to expose shared feature flags that map to the individual
//! workspace crates (`core-service`, `core-playback`). Host applications can
//! depend on `session-workspace` and enable the documented features without
//! needing to wire each crate individually.
//!
//! - `desktop-shims` (default): the full [`core_service::PlaybackService`]
//!   façade with SQLite-backed history and settings stores.
//! - `playback-only`: just the session components from `core-playback`, for
//!   hosts that bring their own storage and wiring.

#[cfg(feature = "desktop-shims")]
pub use core_service;

#[cfg(feature = "playback-only")]
pub use core_playback;
