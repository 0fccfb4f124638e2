//! Key-value settings storage.
//!
//! Used by the core for small preference-style records such as the
//! "last played" track.

use async_trait::async_trait;

use crate::error::Result;

/// Settings storage trait
///
/// Abstracts platform preference stores:
/// - Desktop: SQLite (`bridge-desktop`)
/// - iOS: UserDefaults
/// - Android: SharedPreferences / DataStore
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::SettingsStore;
///
/// async fn remember(store: &dyn SettingsStore) -> Result<()> {
///     store.set_string("playback.last_played", "{...}").await?;
///     store.set_bool("playback.shuffle", true).await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Store a string value
    async fn set_string(&self, key: &str, value: &str) -> Result<()>;

    /// Retrieve a string value
    async fn get_string(&self, key: &str) -> Result<Option<String>>;

    /// Store a boolean value
    async fn set_bool(&self, key: &str, value: bool) -> Result<()>;

    /// Retrieve a boolean value
    async fn get_bool(&self, key: &str) -> Result<Option<bool>>;

    /// Store an integer value
    async fn set_i64(&self, key: &str, value: i64) -> Result<()>;

    /// Retrieve an integer value
    async fn get_i64(&self, key: &str) -> Result<Option<i64>>;

    /// Delete a setting
    async fn delete(&self, key: &str) -> Result<()>;

    /// Check if a setting exists
    async fn has_key(&self, key: &str) -> Result<bool>;

    /// List all setting keys
    async fn list_keys(&self) -> Result<Vec<String>>;
}
