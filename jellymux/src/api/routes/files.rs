//! File listing and status counts.

use std::collections::BTreeMap;
use std::path::Path;

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};
use strum::IntoEnumIterator;

use crate::api::error::{ApiError, ApiResult};
use crate::api::models::{FileEntry, FileListQuery, FileListResponse, StatsResponse};
use crate::api::server::AppState;
use crate::database::models::FileStatus;

/// Category for files outside any series or movies folder.
pub const OTHER_CATEGORY: &str = "Other";

/// Create the file listing router.
pub fn router() -> Router<AppState> {
    Router::new().route("/", get(list_files))
}

/// Create the stats router.
pub fn stats_router() -> Router<AppState> {
    Router::new().route("/", get(stats))
}

/// Library category of a path: the first segment that mentions `series` or
/// `movies` (any case), as written; `Other` if none does.
pub fn category_for_path(path: &str) -> String {
    path.split(['/', '\\'])
        .find(|segment| {
            let lower = segment.to_lowercase();
            lower.contains("series") || lower.contains("movies")
        })
        .unwrap_or(OTHER_CATEGORY)
        .to_string()
}

fn display_path(path: &str, scan_root: &Path) -> String {
    Path::new(path)
        .strip_prefix(scan_root)
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|_| path.to_string())
}

async fn list_files(
    State(state): State<AppState>,
    Query(query): Query<FileListQuery>,
) -> ApiResult<Json<FileListResponse>> {
    let files = match query.status.as_deref() {
        Some(status) => {
            let status = FileStatus::parse(status)
                .ok_or_else(|| ApiError::bad_request(format!("unknown status '{}'", status)))?;
            state.media_files.list_by_status(status).await?
        }
        None => state.media_files.list_all().await?,
    };

    let total = files.len();
    let mut categories: BTreeMap<String, Vec<FileEntry>> = BTreeMap::new();
    for file in files {
        let display = display_path(&file.path, &state.scan_root);
        categories
            .entry(category_for_path(&file.path))
            .or_default()
            .push(FileEntry::from_model(file, display));
    }

    Ok(Json(FileListResponse { total, categories }))
}

async fn stats(State(state): State<AppState>) -> ApiResult<Json<StatsResponse>> {
    let mut by_status: BTreeMap<String, i64> = FileStatus::iter()
        .map(|s| (s.to_string(), 0))
        .collect();
    for (status, count) in state.media_files.count_by_status().await? {
        by_status.insert(status, count);
    }
    let total = by_status.values().sum();

    Ok(Json(StatsResponse { total, by_status }))
}
