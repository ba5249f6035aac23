//! Media file database models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::database::time::ms_to_datetime;

/// Media file database model.
/// One row per discovered video file, keyed by its path.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct MediaFileDbModel {
    pub id: i64,
    pub path: String,
    /// Hex digest of modification time and size.
    pub fingerprint: String,
    /// Status: waiting, processing, processed, error
    pub status: String,
    /// Failure description, set when status is `error`.
    pub status_message: Option<String>,
    pub is_h265: bool,
    /// Unix epoch ms of the scan that last wrote this row.
    pub last_checked: i64,
    /// Unix epoch ms of the last write of any kind.
    pub updated_at: i64,
}

impl MediaFileDbModel {
    /// Parsed status, `None` if the stored text is not a known status.
    pub fn file_status(&self) -> Option<FileStatus> {
        FileStatus::parse(&self.status)
    }

    pub fn last_checked_at(&self) -> DateTime<Utc> {
        ms_to_datetime(self.last_checked)
    }
}

/// Processing status of a media file.
///
/// `waiting -> processing -> {processed, error}`; a fingerprint change sends
/// any state back to `waiting`.
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
    strum::EnumIter,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    /// Queued for the process loop.
    Waiting,
    /// Claimed by the process loop.
    Processing,
    /// Tracks muxed (or nothing to mux).
    Processed,
    /// A pipeline step failed; see the status message.
    Error,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Processing => "processing",
            Self::Processed => "processed",
            Self::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "waiting" => Some(Self::Waiting),
            "processing" => Some(Self::Processing),
            "processed" => Some(Self::Processed),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    /// Terminal until the next fingerprint change.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Processed | Self::Error)
    }
}
