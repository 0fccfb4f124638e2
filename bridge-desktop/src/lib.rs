//! # Desktop Bridge Implementations
//!
//! Default implementations of the storage and content bridges for desktop
//! hosts (macOS, Windows, Linux).
//!
//! - [`SqliteHistoryStore`]: listening sessions and track plays in SQLite
//! - [`SqliteSettingsStore`]: typed key-value settings in SQLite
//! - [`LocalFirstResolver`]: plays downloaded files, streams everything else
//!
//! The playback engine itself is host-provided; there is no desktop
//! default for `EngineConnector`.
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{LocalFirstResolver, SqliteHistoryStore, SqliteSettingsStore};
//!
//! let history = SqliteHistoryStore::new("data/playback.db".into()).await?;
//! let settings = SqliteSettingsStore::new("data/playback.db".into()).await?;
//! let resolver = LocalFirstResolver::new("/music", "https://archive.example.org/download");
//! ```

mod db;
mod history;
mod resolver;
mod settings;

pub use history::SqliteHistoryStore;
pub use resolver::LocalFirstResolver;
pub use settings::SqliteSettingsStore;
