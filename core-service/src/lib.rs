//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (engine, catalog,
//! resolver, history and settings storage) into the playback session core
//! and exposes the result as a single [`PlaybackService`].
//!
//! Desktop apps typically enable the `desktop-shims` feature (which depends
//! on `bridge-desktop`) and call [`bootstrap_desktop`]; other hosts build a
//! [`CoreConfig`] themselves and call [`PlaybackService::start`].
//!
//! ```ignore
//! let service = bootstrap_desktop(data_dir.join("playback.db"), engine, catalog, resolver).await?;
//! let mut snapshots = service.subscribe();
//! service.restore_last_session().await?;
//! ```

pub mod error;
mod service;

pub use error::{CoreError, Result};
pub use service::PlaybackService;

pub use core_playback::{
    Command, ConnectionState, PlaybackConfig, PlaybackSnapshot, Queue, ResumeCandidate,
};
pub use core_runtime::config::CoreConfig;

#[cfg(feature = "desktop-shims")]
use std::{path::PathBuf, sync::Arc};

#[cfg(feature = "desktop-shims")]
use bridge_traits::{EngineConnector, PlayableUrlResolver, RecordingCatalog};

/// Convenience bootstrapper for desktop hosts.
///
/// Opens (or creates) the SQLite database at `db_path` for both listening
/// history and settings, and starts a service with the default
/// [`PlaybackConfig`].
#[cfg(feature = "desktop-shims")]
pub async fn bootstrap_desktop(
    db_path: PathBuf,
    engine: Arc<dyn EngineConnector>,
    catalog: Arc<dyn RecordingCatalog>,
    resolver: Arc<dyn PlayableUrlResolver>,
) -> Result<PlaybackService> {
    use bridge_desktop::{SqliteHistoryStore, SqliteSettingsStore};

    let history = SqliteHistoryStore::new(db_path.clone())
        .await
        .map_err(|err| CoreError::InitializationFailed(err.to_string()))?;
    let settings = SqliteSettingsStore::new(db_path)
        .await
        .map_err(|err| CoreError::InitializationFailed(err.to_string()))?;

    let config = CoreConfig::builder()
        .engine_connector(engine)
        .catalog(catalog)
        .resolver(resolver)
        .history_store(Arc::new(history))
        .settings_store(Arc::new(settings))
        .build()?;

    PlaybackService::start(config, PlaybackConfig::default())
}
