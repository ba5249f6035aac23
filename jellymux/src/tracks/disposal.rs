//! What happens to track files once they are part of the video.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, warn};

use super::Track;
use crate::config::ConsumedTrackPolicy;
use crate::{Error, Result};

/// Directory next to the video that moved tracks end up in.
pub const EXTRA_DIR: &str = "Extra";

/// Apply `policy` to every muxed track.
///
/// Failures are logged per track and do not stop the others. Returns the
/// number of tracks deleted or moved.
pub async fn dispose(policy: ConsumedTrackPolicy, video_path: &Path, tracks: &[Track]) -> usize {
    if policy == ConsumedTrackPolicy::Keep {
        return 0;
    }

    let mut done = 0;
    for track in tracks {
        let result = match policy {
            ConsumedTrackPolicy::Keep => Ok(()),
            ConsumedTrackPolicy::Delete => fs::remove_file(&track.path)
                .await
                .map_err(|e| Error::io_path("deleting", &track.path, e)),
            ConsumedTrackPolicy::Move => move_to_extra(video_path, &track.path).await.map(|_| ()),
        };
        match result {
            Ok(()) => {
                debug!(track = %track.path.display(), %policy, "Disposed of muxed track");
                done += 1;
            }
            Err(e) => {
                warn!(track = %track.path.display(), %policy, error = %e, "Failed to dispose of muxed track");
            }
        }
    }
    done
}

/// Move `track` into the `Extra` directory beside `video_path`.
async fn move_to_extra(video_path: &Path, track: &Path) -> Result<PathBuf> {
    let dir = video_path
        .parent()
        .map(|p| p.join(EXTRA_DIR))
        .unwrap_or_else(|| PathBuf::from(EXTRA_DIR));
    let file_name = track
        .file_name()
        .ok_or_else(|| Error::Other(format!("track has no file name: {}", track.display())))?;
    let dest = dir.join(file_name);

    fs::create_dir_all(&dir)
        .await
        .map_err(|e| Error::io_path("creating", &dir, e))?;

    if fs::rename(track, &dest).await.is_err() {
        // Different filesystem: copy, then drop the source.
        fs::copy(track, &dest)
            .await
            .map_err(|e| Error::io_path("copying", track, e))?;
        fs::remove_file(track)
            .await
            .map_err(|e| Error::io_path("removing", track, e))?;
    }
    Ok(dest)
}
