//! Directory scanner.
//!
//! Walks the scan root, fingerprints every video file by modification time
//! and size, and queues new or changed files for processing. File contents,
//! codecs and tracks are not looked at here.

use std::path::Path;
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::database::repositories::MediaFileRepository;
use crate::database::time::now_ms;
use crate::{Error, Result};

/// Outcome of one pass over the scan root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    /// Video files found.
    pub files_seen: usize,
    /// New or changed files reset to `waiting`.
    pub queued: usize,
    /// Files whose fingerprint matched the stored one.
    pub unchanged: usize,
    /// Entries that could not be visited, as `path: error`.
    pub errors: Vec<String>,
}

/// A video file seen by the walk.
#[derive(Debug)]
struct Observation {
    path: String,
    fingerprint: String,
}

/// Content-change token: SHA-256 over modification time (ns) and size.
///
/// Changes iff mtime or size changed. Content rewritten in place with both
/// preserved goes unnoticed.
pub fn fingerprint(metadata: &std::fs::Metadata) -> std::io::Result<String> {
    let modified = metadata.modified()?;
    let nanos: i128 = match modified.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_nanos() as i128,
        Err(e) => -(e.duration().as_nanos() as i128),
    };
    let digest = Sha256::digest(format!("{}-{}", nanos, metadata.len()).as_bytes());
    Ok(hex::encode(digest))
}

/// Fingerprint the file at `path`, following symlinks.
pub async fn fingerprint_path(path: &Path) -> Result<String> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| Error::io_path("reading metadata of", path, e))?;
    fingerprint(&metadata).map_err(|e| Error::io_path("reading mtime of", path, e))
}

/// Whether `file_name` ends in `.{extension}`, ignoring ASCII case.
pub fn has_extension(file_name: &str, extension: &str) -> bool {
    let name = file_name.as_bytes();
    let ext = extension.as_bytes();
    name.len() > ext.len()
        && name[name.len() - ext.len() - 1] == b'.'
        && name[name.len() - ext.len()..].eq_ignore_ascii_case(ext)
}

/// Scans a directory tree and upserts what it finds into the store.
pub struct Scanner {
    repo: Arc<dyn MediaFileRepository>,
    extension: String,
}

impl Scanner {
    /// `extension` is the video container extension without the dot.
    pub fn new(repo: Arc<dyn MediaFileRepository>, extension: impl Into<String>) -> Self {
        Self {
            repo,
            extension: extension.into(),
        }
    }

    /// Run one pass over `root`.
    ///
    /// Errors on individual entries are collected in the report and the walk
    /// continues. A missing root or a store failure fails the pass.
    pub async fn scan(&self, root: &Path) -> Result<ScanReport> {
        let root_meta = tokio::fs::metadata(root)
            .await
            .map_err(|e| Error::Scan(format!("cannot access {}: {}", root.display(), e)))?;
        if !root_meta.is_dir() {
            return Err(Error::Scan(format!(
                "{} is not a directory",
                root.display()
            )));
        }

        info!(root = %root.display(), "Starting scan");

        let walk_root = root.to_path_buf();
        let extension = self.extension.clone();
        let (observations, errors) =
            tokio::task::spawn_blocking(move || walk(&walk_root, &extension))
                .await
                .map_err(|e| Error::Other(format!("scan task failed: {}", e)))?;

        let mut report = ScanReport {
            files_seen: observations.len(),
            errors,
            ..Default::default()
        };

        for observation in observations {
            let written = self
                .repo
                .upsert_observation(&observation.path, &observation.fingerprint, now_ms())
                .await?;
            if written {
                debug!(path = %observation.path, "Queued for processing");
                report.queued += 1;
            } else {
                report.unchanged += 1;
            }
        }

        info!(
            files = report.files_seen,
            queued = report.queued,
            unchanged = report.unchanged,
            errors = report.errors.len(),
            "Scan complete"
        );

        Ok(report)
    }
}

/// Blocking directory walk.
fn walk(root: &Path, extension: &str) -> (Vec<Observation>, Vec<String>) {
    let mut observations = Vec::new();
    let mut errors = Vec::new();

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Error walking directory: {}", e);
                errors.push(e.to_string());
                continue;
            }
        };

        if entry.file_type().is_dir() {
            continue;
        }
        if !has_extension(&entry.file_name().to_string_lossy(), extension) {
            continue;
        }

        match observe(entry.path()) {
            Ok(observation) => observations.push(observation),
            Err(e) => {
                warn!(path = %entry.path().display(), "Skipping file: {}", e);
                errors.push(format!("{}: {}", entry.path().display(), e));
            }
        }
    }

    (observations, errors)
}

fn observe(path: &Path) -> std::result::Result<Observation, String> {
    let path_str = path
        .to_str()
        .ok_or_else(|| "path is not valid UTF-8".to_string())?;
    let metadata = std::fs::metadata(path).map_err(|e| e.to_string())?;
    let fingerprint = fingerprint(&metadata).map_err(|e| e.to_string())?;
    Ok(Observation {
        path: path_str.to_string(),
        fingerprint,
    })
}

/// Modification time helper for tests that need to move mtime around.
#[cfg(test)]
pub(crate) fn set_mtime(path: &Path, time: std::time::SystemTime) {
    std::fs::File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(time)
        .unwrap();
}
