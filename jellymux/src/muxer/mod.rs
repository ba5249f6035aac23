//! Remuxing tracks into a video with mkvmerge.
//!
//! Output goes to a sibling temp file which is renamed over the original
//! only once mkvmerge succeeded. The original path never holds a partially
//! written file.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use process_utils::{output_with_timeout, tokio_command};
use tracing::{debug, info, warn};

use crate::tracks::{Track, TrackKind};
use crate::{Error, Result};

/// Appended to the video path to name mkvmerge's output.
pub const TEMP_SUFFIX: &str = ".jellymux.tmp";

/// Attaches tracks (and font files) to a video in place.
#[async_trait]
pub trait Muxer: Send + Sync {
    async fn mux(&self, video_path: &Path, tracks: &[Track], attachments: &[PathBuf])
    -> Result<()>;
}

/// Path mkvmerge writes to before the rename.
pub fn temp_path(video_path: &Path) -> PathBuf {
    let mut path = video_path.as_os_str().to_owned();
    path.push(TEMP_SUFFIX);
    PathBuf::from(path)
}

/// Muxer backed by `mkvmerge`.
#[derive(Debug, Clone)]
pub struct MkvMerge {
    program: String,
    timeout: Duration,
}

impl MkvMerge {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    /// mkvmerge arguments writing `video_path` plus `tracks` and
    /// `attachments` to `output`.
    ///
    /// A lone subtitle track is flagged default. Forced tracks are flagged
    /// default and forced.
    pub fn build_args(
        video_path: &Path,
        tracks: &[Track],
        attachments: &[PathBuf],
        output: &Path,
    ) -> Vec<OsString> {
        let single_subtitle = tracks
            .iter()
            .filter(|t| t.kind == TrackKind::Subtitle)
            .count()
            == 1;

        let mut args: Vec<OsString> = vec!["-o".into(), output.into(), video_path.into()];
        for track in tracks {
            args.push("--language".into());
            args.push(format!("0:{}", track.language).into());
            if let Some(name) = &track.display_name {
                args.push("--track-name".into());
                args.push(format!("0:{}", name).into());
            }
            if track.forced || (single_subtitle && track.kind == TrackKind::Subtitle) {
                args.push("--default-track-flag".into());
                args.push("0:yes".into());
            }
            if track.forced {
                args.push("--forced-display-flag".into());
                args.push("0:yes".into());
            }
            args.push(track.path.clone().into());
        }
        for attachment in attachments {
            args.push("--attach-file".into());
            args.push(attachment.into());
        }
        args
    }

    async fn run(
        &self,
        video_path: &Path,
        tracks: &[Track],
        attachments: &[PathBuf],
        output: &Path,
    ) -> Result<()> {
        let args = Self::build_args(video_path, tracks, attachments, output);
        debug!(program = %self.program, ?args, "Running mkvmerge");

        let mut cmd = tokio_command(&self.program);
        cmd.args(&args);

        let result = match output_with_timeout(&mut cmd, self.timeout).await {
            Ok(result) => result,
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                return Err(Error::tool_timeout("mkvmerge", self.timeout));
            }
            Err(e) => {
                return Err(Error::Mux(format!("failed to run {}: {}", self.program, e)));
            }
        };

        // 1 means finished with warnings; the output is usable.
        match result.status.code() {
            Some(0) => Ok(()),
            Some(1) => {
                warn!(
                    video = %video_path.display(),
                    output = %last_line(&result.stdout),
                    "mkvmerge finished with warnings"
                );
                Ok(())
            }
            _ => {
                // mkvmerge reports errors on stdout.
                let mut detail = last_line(&result.stdout);
                if detail.is_empty() {
                    detail = last_line(&result.stderr);
                }
                Err(Error::Mux(format!("exited with {}: {}", result.status, detail)))
            }
        }
    }
}

fn last_line(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or_default()
        .to_string()
}

#[async_trait]
impl Muxer for MkvMerge {
    async fn mux(
        &self,
        video_path: &Path,
        tracks: &[Track],
        attachments: &[PathBuf],
    ) -> Result<()> {
        if tracks.is_empty() {
            debug!(video = %video_path.display(), "No tracks to mux");
            return Ok(());
        }

        let temp = temp_path(video_path);
        let replaced = match self.run(video_path, tracks, attachments, &temp).await {
            Ok(()) => tokio::fs::rename(&temp, video_path)
                .await
                .map_err(|e| Error::io_path("replacing", video_path, e)),
            Err(e) => Err(e),
        };

        if let Err(e) = replaced {
            if let Err(remove_err) = tokio::fs::remove_file(&temp).await
                && remove_err.kind() != std::io::ErrorKind::NotFound
            {
                warn!(
                    path = %temp.display(),
                    error = %remove_err,
                    "Failed to remove mkvmerge output"
                );
            }
            return Err(e);
        }

        info!(
            video = %video_path.display(),
            tracks = tracks.len(),
            attachments = attachments.len(),
            "Muxed tracks into video"
        );
        Ok(())
    }
}
