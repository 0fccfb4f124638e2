//! Local-first playable URL resolution.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bridge_traits::{content::PlayableUrlResolver, error::Result, media::TrackRef};
use tracing::{debug, trace};

/// Extensions tried, in order, when looking for a downloaded copy.
const AUDIO_EXTENSIONS: &[&str] = &["flac", "mp3", "ogg", "m4a"];

/// Resolves a track to its downloaded file when one exists under
/// `library_root/<recording_id>/<track_id>.<ext>`, and to
/// `stream_base_url/<recording_id>/<track_id>` otherwise.
///
/// The same [`TrackRef`] resolves to different URLs depending on what is on
/// disk; identity stays with the track.
pub struct LocalFirstResolver {
    library_root: PathBuf,
    stream_base_url: String,
}

impl LocalFirstResolver {
    pub fn new(library_root: impl Into<PathBuf>, stream_base_url: impl Into<String>) -> Self {
        Self {
            library_root: library_root.into(),
            stream_base_url: stream_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn local_file(&self, track: &TrackRef) -> Option<PathBuf> {
        let dir = self.library_root.join(&track.recording_id);
        for ext in AUDIO_EXTENSIONS {
            let candidate = dir.join(format!("{}.{}", track.track_id, ext));
            match tokio::fs::metadata(&candidate).await {
                Ok(meta) if meta.is_file() => return Some(candidate),
                Ok(_) => {}
                Err(e) => trace!(path = ?candidate, error = %e, "No local copy"),
            }
        }
        None
    }
}

fn file_url(path: &Path) -> String {
    let path = path.to_string_lossy().replace('\\', "/");
    if path.starts_with('/') {
        format!("file://{}", path)
    } else {
        format!("file:///{}", path)
    }
}

#[async_trait]
impl PlayableUrlResolver for LocalFirstResolver {
    async fn resolve_playable_url(&self, track: &TrackRef) -> Result<String> {
        if let Some(path) = self.local_file(track).await {
            debug!(track = %track, "Resolved to local file");
            return Ok(file_url(&path));
        }
        debug!(track = %track, "Resolved to stream");
        Ok(format!(
            "{}/{}/{}",
            self.stream_base_url, track.recording_id, track.track_id
        ))
    }
}
