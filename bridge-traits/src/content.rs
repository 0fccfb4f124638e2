//! Content resolution and catalog lookup.
//!
//! - [`PlayableUrlResolver`] turns a logical track into something the engine
//!   can open (a local file when downloaded, a stream URL otherwise).
//! - [`RecordingCatalog`] lists the tracks of a recording, which is the
//!   collection a track is played from.

use async_trait::async_trait;

use crate::error::Result;
use crate::media::{TrackInfo, TrackRef};

/// Resolves playable URLs.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::content::PlayableUrlResolver;
///
/// async fn url_for(resolver: &dyn PlayableUrlResolver, track: &TrackRef) -> Result<String> {
///     resolver.resolve_playable_url(track).await
/// }
/// ```
#[async_trait]
pub trait PlayableUrlResolver: Send + Sync {
    async fn resolve_playable_url(&self, track: &TrackRef) -> Result<String>;
}

/// Catalog of recordings and their tracks.
#[async_trait]
pub trait RecordingCatalog: Send + Sync {
    /// Tracks of the recording, in play order.
    ///
    /// Returns `BridgeError::NotFound` for an unknown recording.
    async fn tracks_for_recording(&self, recording_id: &str) -> Result<Vec<TrackInfo>>;
}
