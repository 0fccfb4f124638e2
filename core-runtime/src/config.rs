//! # Core Configuration Module
//!
//! Provides configuration management for the playback session core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! holding every collaborator the core talks to. All collaborators are
//! injected through the constructor; nothing is looked up from ambient global
//! state. Validation is fail-fast: a missing bridge is reported as
//! [`Error::CapabilityMissing`] with a message saying how to provide it.
//!
//! ## Required Dependencies
//!
//! - `EngineConnector` - Binds to the playback engine
//! - `PlayableUrlResolver` - Turns track references into playable URLs
//! - `RecordingCatalog` - Lists the tracks of a recording
//! - `HistoryStore` - Persists listening sessions and track plays
//! - `SettingsStore` - Persists the last-played record
//!
//! ## Optional Dependencies
//!
//! - `Clock` - Wall-clock source (default: `SystemClock`)
//! - `ConnectionToken` - Passed to the engine on connect (default: empty)
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .engine_connector(Arc::new(MyEngine::new()))
//!     .resolver(Arc::new(MyResolver))
//!     .catalog(Arc::new(MyCatalog))
//!     .history_store(Arc::new(history))
//!     .settings_store(Arc::new(settings))
//!     .connection_token(ConnectionToken::new("media-session"))
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use bridge_traits::{
    Clock, ConnectionToken, EngineConnector, HistoryStore, PlayableUrlResolver, RecordingCatalog,
    SettingsStore, SystemClock,
};
use std::sync::Arc;

/// Collaborators and settings required to start a playback session core.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Playback engine connector (required)
    pub engine_connector: Arc<dyn EngineConnector>,

    /// Token handed to the engine on every connect attempt
    pub connection_token: ConnectionToken,

    /// Playable URL resolver (required)
    pub resolver: Arc<dyn PlayableUrlResolver>,

    /// Recording catalog (required)
    pub catalog: Arc<dyn RecordingCatalog>,

    /// Listening history persistence (required)
    pub history_store: Arc<dyn HistoryStore>,

    /// Key-value preferences (required)
    pub settings_store: Arc<dyn SettingsStore>,

    /// Wall-clock source
    pub clock: Arc<dyn Clock>,

    /// Buffer size of the diagnostic event bus
    pub event_buffer_size: usize,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("engine_connector", &"EngineConnector { ... }")
            .field("connection_token", &self.connection_token)
            .field("resolver", &"PlayableUrlResolver { ... }")
            .field("catalog", &"RecordingCatalog { ... }")
            .field("history_store", &"HistoryStore { ... }")
            .field("settings_store", &"SettingsStore { ... }")
            .field("clock", &"Clock { ... }")
            .field("event_buffer_size", &self.event_buffer_size)
            .finish()
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        if self.event_buffer_size > 65_536 {
            return Err(Error::Config(
                "Event buffer size exceeds maximum of 65,536 events".to_string(),
            ));
        }

        Ok(())
    }
}

fn capability_missing(capability: &str, message: &str) -> Error {
    Error::CapabilityMissing {
        capability: capability.to_string(),
        message: message.to_string(),
    }
}

/// Builder for [`CoreConfig`].
#[derive(Default)]
pub struct CoreConfigBuilder {
    engine_connector: Option<Arc<dyn EngineConnector>>,
    connection_token: Option<ConnectionToken>,
    resolver: Option<Arc<dyn PlayableUrlResolver>>,
    catalog: Option<Arc<dyn RecordingCatalog>>,
    history_store: Option<Arc<dyn HistoryStore>>,
    settings_store: Option<Arc<dyn SettingsStore>>,
    clock: Option<Arc<dyn Clock>>,
    event_buffer_size: Option<usize>,
}

impl CoreConfigBuilder {
    /// Sets the playback engine connector.
    pub fn engine_connector(mut self, connector: Arc<dyn EngineConnector>) -> Self {
        self.engine_connector = Some(connector);
        self
    }

    /// Sets the token passed to the engine on connect.
    pub fn connection_token(mut self, token: ConnectionToken) -> Self {
        self.connection_token = Some(token);
        self
    }

    /// Sets the playable URL resolver.
    pub fn resolver(mut self, resolver: Arc<dyn PlayableUrlResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Sets the recording catalog.
    pub fn catalog(mut self, catalog: Arc<dyn RecordingCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Sets the history store.
    pub fn history_store(mut self, store: Arc<dyn HistoryStore>) -> Self {
        self.history_store = Some(store);
        self
    }

    /// Sets the settings store.
    pub fn settings_store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.settings_store = Some(store);
        self
    }

    /// Overrides the wall-clock source.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Sets the diagnostic event bus buffer size.
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// Returns [`Error::CapabilityMissing`] when a required bridge was not
    /// provided, or [`Error::Config`] when a value is out of range.
    pub fn build(self) -> Result<CoreConfig> {
        let engine_connector = self.engine_connector.ok_or_else(|| {
            capability_missing(
                "EngineConnector",
                "An EngineConnector is required to reach the playback engine. \
                 Inject the host's media-session adapter with .engine_connector().",
            )
        })?;

        let resolver = self.resolver.ok_or_else(|| {
            capability_missing(
                "PlayableUrlResolver",
                "A PlayableUrlResolver is required to build engine queues. \
                 Desktop: use bridge_desktop::LocalFirstResolver.",
            )
        })?;

        let catalog = self.catalog.ok_or_else(|| {
            capability_missing(
                "RecordingCatalog",
                "A RecordingCatalog is required to load a track's recording for playTrack and resume.",
            )
        })?;

        let history_store = self.history_store.ok_or_else(|| {
            capability_missing(
                "HistoryStore",
                "A HistoryStore is required for listening history. \
                 Desktop: use bridge_desktop::SqliteHistoryStore.",
            )
        })?;

        let settings_store = self.settings_store.ok_or_else(|| {
            capability_missing(
                "SettingsStore",
                "A SettingsStore is required for the last-played record. \
                 Desktop: use bridge_desktop::SqliteSettingsStore.",
            )
        })?;

        let config = CoreConfig {
            engine_connector,
            connection_token: self.connection_token.unwrap_or_default(),
            resolver,
            catalog,
            history_store,
            settings_store,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
        };

        config.validate()?;

        Ok(config)
    }
}
