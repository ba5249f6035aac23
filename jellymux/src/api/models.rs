//! Response bodies.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::database::models::MediaFileDbModel;

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

/// Query parameters for the file listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileListQuery {
    /// Only files in this status.
    pub status: Option<String>,
}

/// One file row on the dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    /// Path relative to the scan root.
    pub display_path: String,
    pub status: String,
    pub status_message: Option<String>,
    pub is_h265: bool,
    pub last_checked: DateTime<Utc>,
}

impl FileEntry {
    pub fn from_model(model: MediaFileDbModel, display_path: String) -> Self {
        let last_checked = model.last_checked_at();
        Self {
            path: model.path,
            display_path,
            status: model.status,
            status_message: model.status_message,
            is_h265: model.is_h265,
            last_checked,
        }
    }
}

/// Files grouped by library category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileListResponse {
    pub total: usize,
    pub categories: BTreeMap<String, Vec<FileEntry>>,
}

/// Number of files per status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub total: i64,
    pub by_status: BTreeMap<String, i64>,
}
