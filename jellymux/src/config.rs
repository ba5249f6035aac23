//! Runtime configuration.
//!
//! Everything is read from environment variables (a `.env` file is loaded
//! first by `main`). Unset variables fall back to the defaults below.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::matcher::DEFAULT_MAX_DISTANCE;
use crate::{Error, Result};

/// What to do with track files after they were muxed into a video.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum ConsumedTrackPolicy {
    /// Leave them where they are.
    #[default]
    Keep,
    /// Delete them.
    Delete,
    /// Move them into an `Extra` directory next to the video.
    Move,
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory tree to scan.
    pub scan_root: PathBuf,
    /// SQLite database URL.
    pub database_url: String,
    /// Pause between two directory walks.
    pub scan_interval: Duration,
    /// Pause between two processing attempts.
    pub process_interval: Duration,
    /// Largest edit distance a track may have and still be selected.
    pub max_fuzzy_distance: usize,
    /// Video container extension, without the dot.
    pub video_extension: String,
    pub ffprobe_path: String,
    pub mkvmerge_path: String,
    /// Deadline for a single ffprobe or mkvmerge invocation.
    pub tool_timeout: Duration,
    pub consumed_tracks: ConsumedTrackPolicy,
    pub bind_address: String,
    pub port: u16,
    pub log_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            scan_root: PathBuf::from("/data"),
            database_url: "sqlite:/config/media.db?mode=rwc".to_string(),
            scan_interval: Duration::from_secs(5 * 60),
            process_interval: Duration::from_secs(1),
            max_fuzzy_distance: DEFAULT_MAX_DISTANCE,
            video_extension: "mkv".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            mkvmerge_path: "mkvmerge".to_string(),
            tool_timeout: Duration::from_secs(60 * 60),
            consumed_tracks: ConsumedTrackPolicy::Keep,
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
            log_dir: PathBuf::from("logs"),
        }
    }
}

impl AppConfig {
    /// Load from the process environment.
    ///
    /// Supported env vars:
    /// - `SCAN_ROOT`, `DATABASE_URL`, `VIDEO_EXTENSION`
    /// - `SCAN_INTERVAL_SECS`, `PROCESS_INTERVAL_SECS`, `TOOL_TIMEOUT_SECS`
    /// - `MAX_FUZZY_DISTANCE`
    /// - `FFPROBE_PATH`, `MKVMERGE_PATH`
    /// - `CONSUMED_TRACKS` (`keep`, `delete` or `move`)
    /// - `API_BIND_ADDRESS`, `API_PORT`, `LOG_DIR`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut config = Self::default();

        if let Some(root) = get("SCAN_ROOT") {
            config.scan_root = PathBuf::from(root);
        }
        if let Some(url) = get("DATABASE_URL") {
            config.database_url = url;
        }
        if let Some(secs) = get("SCAN_INTERVAL_SECS") {
            config.scan_interval = Duration::from_secs(parse_var("SCAN_INTERVAL_SECS", &secs)?);
        }
        if let Some(secs) = get("PROCESS_INTERVAL_SECS") {
            config.process_interval =
                Duration::from_secs(parse_var("PROCESS_INTERVAL_SECS", &secs)?);
        }
        if let Some(distance) = get("MAX_FUZZY_DISTANCE") {
            config.max_fuzzy_distance = parse_var("MAX_FUZZY_DISTANCE", &distance)?;
        }
        if let Some(ext) = get("VIDEO_EXTENSION") {
            config.video_extension = ext.trim_start_matches('.').to_ascii_lowercase();
        }
        if let Some(path) = get("FFPROBE_PATH") {
            config.ffprobe_path = path;
        }
        if let Some(path) = get("MKVMERGE_PATH") {
            config.mkvmerge_path = path;
        }
        if let Some(secs) = get("TOOL_TIMEOUT_SECS") {
            config.tool_timeout = Duration::from_secs(parse_var("TOOL_TIMEOUT_SECS", &secs)?);
        }
        if let Some(policy) = get("CONSUMED_TRACKS") {
            config.consumed_tracks = parse_var("CONSUMED_TRACKS", &policy)?;
        }
        if let Some(addr) = get("API_BIND_ADDRESS") {
            config.bind_address = addr;
        }
        if let Some(port) = get("API_PORT") {
            config.port = parse_var("API_PORT", &port)?;
        }
        if let Some(dir) = get("LOG_DIR") {
            config.log_dir = PathBuf::from(dir);
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values the loops cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.scan_interval.is_zero() {
            return Err(Error::config("SCAN_INTERVAL_SECS must be greater than 0"));
        }
        if self.process_interval.is_zero() {
            return Err(Error::config("PROCESS_INTERVAL_SECS must be greater than 0"));
        }
        if self.tool_timeout.is_zero() {
            return Err(Error::config("TOOL_TIMEOUT_SECS must be greater than 0"));
        }
        if self.video_extension.is_empty() {
            return Err(Error::config("VIDEO_EXTENSION must not be empty"));
        }
        Ok(())
    }
}

fn parse_var<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse::<T>()
        .map_err(|e| Error::config(format!("invalid value for {}: '{}' ({})", key, value, e)))
}
