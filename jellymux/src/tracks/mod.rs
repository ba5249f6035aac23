//! External track files and their discovery.
//!
//! Tracks are found fresh for every processing attempt and never stored.

pub mod disposal;
pub mod language;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Error, Result};

/// Subtitle file extensions.
const SUBTITLE_EXTENSIONS: &[&str] = &["srt", "ass", "ssa", "sub", "vtt", "sup"];

/// Audio file extensions.
const AUDIO_EXTENSIONS: &[&str] = &["mka", "ac3", "eac3", "dts", "aac", "flac", "opus"];

/// Subdirectories of the video's directory that are searched as well.
const TRACK_SUBDIRS: &[&str] = &["subs", "sub", "subtitles"];

/// Directory holding fonts for styled subtitles.
const FONT_DIR: &str = "fonts";

/// Font file extensions attached to the container.
const FONT_EXTENSIONS: &[&str] = &["ttf", "otf", "ttc", "otc", "woff", "woff2"];

/// Kind of an external track. Ordering is by name.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Subtitle,
}

impl TrackKind {
    /// Classify a file by extension (without the dot, any case).
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.to_ascii_lowercase();
        if SUBTITLE_EXTENSIONS.contains(&ext.as_str()) {
            Some(Self::Subtitle)
        } else if AUDIO_EXTENSIONS.contains(&ext.as_str()) {
            Some(Self::Audio)
        } else {
            None
        }
    }
}

/// A subtitle or audio file that may be attached to a video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub path: PathBuf,
    /// Language code passed to the muxer.
    pub language: String,
    /// Track name shown by players.
    pub display_name: Option<String>,
    pub kind: TrackKind,
    /// File name says `default`: the track is flagged default and forced.
    pub forced: bool,
}

impl Track {
    /// Build a track from a file path, inferring kind and language.
    ///
    /// Returns `None` for files that are not subtitle or audio tracks.
    pub fn from_path(path: &Path) -> Option<Self> {
        let kind = TrackKind::from_extension(path.extension()?.to_str()?)?;
        let (language, display_name) = match detect_language(path) {
            Some(lang) => (lang.code.to_string(), Some(lang.name.to_string())),
            None => (language::UNDETERMINED.to_string(), None),
        };
        let forced = path
            .file_name()?
            .to_str()?
            .to_lowercase()
            .contains("default");
        Some(Self {
            path: path.to_path_buf(),
            language,
            display_name,
            kind,
            forced,
        })
    }
}

fn is_track_subdir(name: &str) -> bool {
    TRACK_SUBDIRS.contains(&name.to_ascii_lowercase().as_str())
}

fn dir_name_matches(path: &Path, accept: impl Fn(&str) -> bool) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(accept)
}

fn is_font_dir(path: &Path) -> bool {
    dir_name_matches(path, |n| n.eq_ignore_ascii_case(FONT_DIR))
}

fn is_font_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| FONT_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

/// Infer a track's language from its path.
///
/// Tried in order: the last dotted segment of the file stem
/// (`Movie.en.srt`), bracketed tags in the file name (`Movie [chs].ass`),
/// then the directories below the nearest `Subs` directory, nearest first
/// (`Subs/Japanese/01.ass`). Directories above `Subs` are never consulted.
pub fn detect_language(path: &Path) -> Option<language::Language> {
    let stem = path.file_stem()?.to_str()?;

    if let Some((_, tag)) = stem.rsplit_once('.')
        && let Some(lang) = language::lookup(tag)
    {
        return Some(lang);
    }

    for tag in stem.split('[').skip(1).filter_map(|s| s.split_once(']')) {
        if let Some(lang) = language::lookup(tag.0.trim()) {
            return Some(lang);
        }
    }

    let dirs: Vec<&str> = path
        .parent()?
        .components()
        .filter_map(|c| c.as_os_str().to_str())
        .collect();
    let below_subs = dirs.iter().rposition(|d| is_track_subdir(d))? + 1;
    dirs[below_subs..]
        .iter()
        .rev()
        .find_map(|d| language::lookup(d))
}

/// Source of candidate tracks for a video.
#[async_trait]
pub trait TrackDiscovery: Send + Sync {
    async fn discover(&self, video_path: &Path) -> Result<Vec<Track>>;

    /// Font files to attach alongside the tracks.
    async fn discover_fonts(&self, _video_path: &Path) -> Result<Vec<PathBuf>> {
        Ok(Vec::new())
    }
}

/// Regular files (with their size) and subdirectories of one directory.
#[derive(Debug, Default)]
struct Listing {
    files: Vec<(PathBuf, u64)>,
    dirs: Vec<PathBuf>,
}

/// Finds track files next to the video, in its `Subs` directories and in
/// per-language directories inside those (`Subs/Japanese/`).
///
/// Every track in those directories is a candidate, including tracks that
/// belong to other videos; the matcher picks the right one by name. Empty
/// files are skipped.
#[derive(Debug, Clone, Default)]
pub struct SiblingTrackDiscovery;

impl SiblingTrackDiscovery {
    pub fn new() -> Self {
        Self
    }

    fn video_dir(video_path: &Path) -> &Path {
        video_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
    }

    async fn list_dir(dir: &Path) -> Result<Listing> {
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| Error::io_path("listing", dir, e))?;

        let mut listing = Listing::default();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::io_path("listing", dir, e))?
        {
            let path = entry.path();
            let Ok(metadata) = tokio::fs::metadata(&path).await else {
                continue;
            };
            if metadata.is_dir() {
                listing.dirs.push(path);
            } else {
                listing.files.push((path, metadata.len()));
            }
        }
        Ok(listing)
    }

    fn tracks_in(files: &[(PathBuf, u64)], tracks: &mut Vec<Track>) {
        for (path, len) in files {
            let Some(track) = Track::from_path(path) else {
                continue;
            };
            if *len == 0 {
                debug!(path = %path.display(), "Skipping empty track file");
                continue;
            }
            tracks.push(track);
        }
    }
}

#[async_trait]
impl TrackDiscovery for SiblingTrackDiscovery {
    async fn discover(&self, video_path: &Path) -> Result<Vec<Track>> {
        let top = Self::list_dir(Self::video_dir(video_path)).await?;

        let mut tracks = Vec::new();
        Self::tracks_in(&top.files, &mut tracks);

        for subdir in top.dirs.iter().filter(|d| dir_name_matches(d, is_track_subdir)) {
            let listing = Self::list_dir(subdir).await?;
            Self::tracks_in(&listing.files, &mut tracks);

            for lang_dir in listing.dirs.iter().filter(|d| !is_font_dir(d)) {
                Self::tracks_in(&Self::list_dir(lang_dir).await?.files, &mut tracks);
            }
        }

        tracks.sort_by(|a, b| a.path.cmp(&b.path));
        debug!(
            video = %video_path.display(),
            count = tracks.len(),
            "Discovered candidate tracks"
        );
        Ok(tracks)
    }

    /// Fonts from a `Fonts` directory next to the video or inside one of its
    /// `Subs` directories.
    async fn discover_fonts(&self, video_path: &Path) -> Result<Vec<PathBuf>> {
        let top = Self::list_dir(Self::video_dir(video_path)).await?;
        let mut font_dirs: Vec<PathBuf> =
            top.dirs.iter().filter(|d| is_font_dir(d)).cloned().collect();
        for subdir in top.dirs.iter().filter(|d| dir_name_matches(d, is_track_subdir)) {
            let listing = Self::list_dir(subdir).await?;
            font_dirs.extend(listing.dirs.into_iter().filter(|d| is_font_dir(d)));
        }

        let mut fonts = Vec::new();
        for font_dir in font_dirs {
            for (path, len) in Self::list_dir(&font_dir).await?.files {
                if len > 0 && is_font_file(&path) {
                    fonts.push(path);
                }
            }
        }
        fonts.sort();
        debug!(video = %video_path.display(), count = fonts.len(), "Discovered fonts");
        Ok(fonts)
    }
}
