//! Per-file pipeline: probe, discover, match, mux, record the outcome.
//!
//! A record is claimed (`waiting` → `processing`) before any work starts and
//! ends in `processed` or `error`. Errors are stored on the record and never
//! retried; only a later fingerprint change puts it back in the queue. A file
//! whose fingerprint no longer matches the scanned one is still being written
//! and goes straight back to `waiting` untouched.

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::ConsumedTrackPolicy;
use crate::database::models::MediaFileDbModel;
use crate::database::repositories::MediaFileRepository;
use crate::database::time::now_ms;
use crate::matcher::Matcher;
use crate::muxer::Muxer;
use crate::probe::CodecProbe;
use crate::scanner::fingerprint_path;
use crate::tracks::{TrackDiscovery, disposal};
use crate::Result;

/// Result of one processing attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The file reached `processed` with this many tracks muxed in.
    Processed { path: String, tracks: usize },
    /// The file reached `error`.
    Failed { path: String, message: String },
    /// The file changed since it was scanned and was put back in the queue.
    Requeued { path: String },
}

/// What a successful pass produced.
enum Pass {
    /// Size or mtime moved since the scan; nothing was touched.
    Changed { fingerprint: String },
    Done {
        fingerprint: Option<String>,
        tracks: usize,
    },
}

/// Drives queued files through the pipeline, one at a time.
pub struct Processor {
    repo: Arc<dyn MediaFileRepository>,
    probe: Arc<dyn CodecProbe>,
    discovery: Arc<dyn TrackDiscovery>,
    matcher: Matcher,
    muxer: Arc<dyn Muxer>,
    consumed_tracks: ConsumedTrackPolicy,
}

impl Processor {
    pub fn new(
        repo: Arc<dyn MediaFileRepository>,
        probe: Arc<dyn CodecProbe>,
        discovery: Arc<dyn TrackDiscovery>,
        matcher: Matcher,
        muxer: Arc<dyn Muxer>,
    ) -> Self {
        Self {
            repo,
            probe,
            discovery,
            matcher,
            muxer,
            consumed_tracks: ConsumedTrackPolicy::Keep,
        }
    }

    pub fn with_consumed_tracks(mut self, policy: ConsumedTrackPolicy) -> Self {
        self.consumed_tracks = policy;
        self
    }

    /// Claim the oldest waiting record and run it through the pipeline.
    ///
    /// Returns `Ok(None)` when nothing is waiting. Pipeline failures are
    /// recorded on the file and reported as [`ProcessOutcome::Failed`]; only
    /// store failures surface as `Err`.
    pub async fn process_next(&self) -> Result<Option<ProcessOutcome>> {
        let Some(record) = self.repo.claim_next_waiting().await? else {
            return Ok(None);
        };
        info!(id = record.id, path = %record.path, "Processing file");

        match self.run(&record).await {
            Ok(Pass::Changed { fingerprint }) => {
                self.repo
                    .requeue_changed(record.id, &fingerprint, now_ms())
                    .await?;
                info!(path = %record.path, "File changed since it was scanned, requeued");
                Ok(Some(ProcessOutcome::Requeued { path: record.path }))
            }
            Ok(Pass::Done {
                fingerprint,
                tracks,
            }) => {
                let applied = self
                    .repo
                    .mark_processed(record.id, fingerprint.as_deref())
                    .await?;
                if applied {
                    info!(path = %record.path, tracks, "File processed");
                } else {
                    info!(path = %record.path, "File changed while processing, left queued");
                }
                Ok(Some(ProcessOutcome::Processed {
                    path: record.path,
                    tracks,
                }))
            }
            Err(e) => {
                let message = e.to_string();
                warn!(path = %record.path, error = %message, "Processing failed");
                if !self.repo.mark_error(record.id, &message).await? {
                    info!(path = %record.path, "File changed while processing, left queued");
                }
                Ok(Some(ProcessOutcome::Failed {
                    path: record.path,
                    message,
                }))
            }
        }
    }

    async fn run(&self, record: &MediaFileDbModel) -> Result<Pass> {
        let path = Path::new(&record.path);
        let on_disk = fingerprint_path(path).await?;
        if on_disk != record.fingerprint {
            return Ok(Pass::Changed {
                fingerprint: on_disk,
            });
        }

        let is_h265 = self.probe.is_h265(path).await?;
        self.repo.set_h265(record.id, is_h265).await?;

        let candidates = self.discovery.discover(path).await?;
        let selected = self.matcher.match_tracks(path, &candidates)?;
        if selected.is_empty() {
            info!(path = %record.path, candidates = candidates.len(), "No matching tracks");
            return Ok(Pass::Done {
                fingerprint: None,
                tracks: 0,
            });
        }

        let fonts = self.discovery.discover_fonts(path).await?;
        self.muxer.mux(path, &selected, &fonts).await?;

        // The remux changed mtime and size; store the new fingerprint so the
        // next scan does not queue the file again.
        let fingerprint = fingerprint_path(path).await?;

        disposal::dispose(self.consumed_tracks, path, &selected).await;

        Ok(Pass::Done {
            fingerprint: Some(fingerprint),
            tracks: selected.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::database::models::FileStatus;
    use crate::database::repositories::SqlxMediaFileRepository;
    use crate::database::test_pool;
    use crate::scanner::Scanner;
    use crate::tracks::{SiblingTrackDiscovery, Track};
    use async_trait::async_trait;
    use std::io::Write;
    use std::path::PathBuf;
    use std::sync::Mutex;

    struct FakeProbe(std::result::Result<bool, String>);

    #[async_trait]
    impl CodecProbe for FakeProbe {
        async fn is_h265(&self, _path: &Path) -> Result<bool> {
            self.0.clone().map_err(Error::Probe)
        }
    }

    type MuxCall = (PathBuf, Vec<Track>, Vec<PathBuf>);

    /// Appends the track names to the video, like a real remux growing it.
    #[derive(Default)]
    struct FakeMuxer {
        calls: Mutex<Vec<MuxCall>>,
        fail: bool,
    }

    #[async_trait]
    impl Muxer for FakeMuxer {
        async fn mux(
            &self,
            video_path: &Path,
            tracks: &[Track],
            attachments: &[PathBuf],
        ) -> Result<()> {
            self.calls.lock().unwrap().push((
                video_path.to_path_buf(),
                tracks.to_vec(),
                attachments.to_vec(),
            ));
            if self.fail {
                return Err(Error::Mux("exited with exit status: 2: boom".to_string()));
            }
            let mut bytes = std::fs::read(video_path).unwrap();
            for track in tracks {
                bytes.extend_from_slice(track.path.to_string_lossy().as_bytes());
            }
            std::fs::write(video_path, bytes).unwrap();
            Ok(())
        }
    }

    struct Harness {
        dir: tempfile::TempDir,
        repo: Arc<SqlxMediaFileRepository>,
        muxer: Arc<FakeMuxer>,
        processor: Processor,
    }

    async fn harness(probe: FakeProbe, muxer: FakeMuxer) -> Harness {
        let repo = Arc::new(SqlxMediaFileRepository::new(test_pool().await));
        let muxer = Arc::new(muxer);
        let processor = Processor::new(
            repo.clone(),
            Arc::new(probe),
            Arc::new(SiblingTrackDiscovery::new()),
            Matcher::default(),
            muxer.clone(),
        );
        Harness {
            dir: tempfile::tempdir().unwrap(),
            repo,
            muxer,
            processor,
        }
    }

    impl Harness {
        async fn scan(&self) {
            Scanner::new(self.repo.clone(), "mkv")
                .scan(self.dir.path())
                .await
                .unwrap();
        }

        async fn record(&self, name: &str) -> MediaFileDbModel {
            let path = self.dir.path().join(name);
            self.repo
                .get_by_path(&path.to_string_lossy())
                .await
                .unwrap()
                .unwrap()
        }
    }

    #[tokio::test]
    async fn test_empty_queue() {
        let h = harness(FakeProbe(Ok(false)), FakeMuxer::default()).await;
        assert_eq!(h.processor.process_next().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_movie_with_subtitle_is_processed() {
        let h = harness(FakeProbe(Ok(false)), FakeMuxer::default()).await;
        let video = h.dir.path().join("Movie.mkv");
        std::fs::write(&video, b"video").unwrap();
        std::fs::write(h.dir.path().join("Movie.en.srt"), b"1\n").unwrap();
        h.scan().await;
        assert_eq!(h.record("Movie.mkv").await.file_status(), Some(FileStatus::Waiting));

        let outcome = h.processor.process_next().await.unwrap().unwrap();

        assert!(matches!(outcome, ProcessOutcome::Processed { tracks: 1, .. }));
        let record = h.record("Movie.mkv").await;
        assert_eq!(record.file_status(), Some(FileStatus::Processed));
        assert_eq!(record.status_message, None);
        assert!(!record.is_h265);

        let calls = h.muxer.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, video);
        assert_eq!(calls[0].1[0].language, "eng");
        assert!(calls[0].2.is_empty());
        drop(calls);

        // The remuxed file is not queued again.
        h.scan().await;
        assert_eq!(h.record("Movie.mkv").await.file_status(), Some(FileStatus::Processed));
        assert_eq!(h.processor.process_next().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_still_being_written_is_requeued_untouched() {
        let h = harness(FakeProbe(Ok(false)), FakeMuxer::default()).await;
        let video = h.dir.path().join("Movie.mkv");
        std::fs::write(&video, b"PARTIAL").unwrap();
        std::fs::write(h.dir.path().join("Movie.en.srt"), b"1\n").unwrap();
        h.scan().await;

        // The copy keeps growing after the scan.
        std::fs::OpenOptions::new()
            .append(true)
            .open(&video)
            .unwrap()
            .write_all(b"MORE")
            .unwrap();

        let outcome = h.processor.process_next().await.unwrap().unwrap();

        assert!(matches!(outcome, ProcessOutcome::Requeued { .. }));
        assert!(h.muxer.calls.lock().unwrap().is_empty());
        assert_eq!(std::fs::read(&video).unwrap(), b"PARTIALMORE");
        let record = h.record("Movie.mkv").await;
        assert_eq!(record.file_status(), Some(FileStatus::Waiting));
        assert_eq!(record.fingerprint, fingerprint_path(&video).await.unwrap());

        // Once it stops changing it goes through.
        let outcome = h.processor.process_next().await.unwrap().unwrap();
        assert!(matches!(outcome, ProcessOutcome::Processed { tracks: 1, .. }));
        assert_eq!(h.muxer.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_fonts_are_passed_to_muxer() {
        let h = harness(FakeProbe(Ok(false)), FakeMuxer::default()).await;
        let fonts = h.dir.path().join("Fonts");
        std::fs::create_dir(&fonts).unwrap();
        std::fs::write(fonts.join("Serif.ttf"), b"font").unwrap();
        std::fs::write(h.dir.path().join("Movie.mkv"), b"video").unwrap();
        std::fs::write(h.dir.path().join("Movie.en.ass"), b"[Script Info]").unwrap();
        h.scan().await;

        h.processor.process_next().await.unwrap();

        let calls = h.muxer.calls.lock().unwrap();
        assert_eq!(calls[0].2, vec![fonts.join("Serif.ttf")]);
    }

    #[tokio::test]
    async fn test_no_tracks_is_processed_without_mux() {
        let h = harness(FakeProbe(Ok(true)), FakeMuxer::default()).await;
        std::fs::write(h.dir.path().join("Movie.mkv"), b"video").unwrap();
        h.scan().await;

        let outcome = h.processor.process_next().await.unwrap().unwrap();

        assert!(matches!(outcome, ProcessOutcome::Processed { tracks: 0, .. }));
        let record = h.record("Movie.mkv").await;
        assert_eq!(record.file_status(), Some(FileStatus::Processed));
        assert!(record.is_h265);
        assert!(h.muxer.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tie_marks_error_and_skips_mux() {
        let h = harness(FakeProbe(Ok(false)), FakeMuxer::default()).await;
        std::fs::write(h.dir.path().join("Movie.mkv"), b"video").unwrap();
        std::fs::write(h.dir.path().join("Movie.A.en.srt"), b"a").unwrap();
        std::fs::write(h.dir.path().join("Movie.B.en.srt"), b"b").unwrap();
        h.scan().await;

        let outcome = h.processor.process_next().await.unwrap().unwrap();

        assert!(matches!(outcome, ProcessOutcome::Failed { .. }));
        let record = h.record("Movie.mkv").await;
        assert_eq!(record.file_status(), Some(FileStatus::Error));
        assert!(record.status_message.unwrap().contains("tie in fuzzy matching for subtitle"));
        assert!(h.muxer.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_probe_failure_marks_error() {
        let h = harness(
            FakeProbe(Err("invalid ffprobe output".to_string())),
            FakeMuxer::default(),
        )
        .await;
        std::fs::write(h.dir.path().join("Movie.mkv"), b"video").unwrap();
        h.scan().await;

        h.processor.process_next().await.unwrap();

        let record = h.record("Movie.mkv").await;
        assert_eq!(record.file_status(), Some(FileStatus::Error));
        assert!(record.status_message.unwrap().contains("invalid ffprobe output"));
    }

    #[tokio::test]
    async fn test_mux_failure_marks_error() {
        let muxer = FakeMuxer {
            fail: true,
            ..Default::default()
        };
        let h = harness(FakeProbe(Ok(false)), muxer).await;
        std::fs::write(h.dir.path().join("Movie.mkv"), b"video").unwrap();
        std::fs::write(h.dir.path().join("Movie.en.srt"), b"1\n").unwrap();
        h.scan().await;

        h.processor.process_next().await.unwrap();

        let record = h.record("Movie.mkv").await;
        assert_eq!(record.file_status(), Some(FileStatus::Error));
        assert!(record.status_message.unwrap().starts_with("mkvmerge failed"));

        // Errors stay put until the file changes.
        h.scan().await;
        assert_eq!(h.processor.process_next().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_vanished_file_marks_error() {
        let h = harness(FakeProbe(Ok(false)), FakeMuxer::default()).await;
        let video = h.dir.path().join("Movie.mkv");
        std::fs::write(&video, b"video").unwrap();
        h.scan().await;
        std::fs::remove_file(&video).unwrap();

        let outcome = h.processor.process_next().await.unwrap().unwrap();

        assert!(matches!(outcome, ProcessOutcome::Failed { .. }));
        assert_eq!(h.record("Movie.mkv").await.file_status(), Some(FileStatus::Error));
    }

    #[tokio::test]
    async fn test_consumed_tracks_are_moved() {
        let repo = Arc::new(SqlxMediaFileRepository::new(test_pool().await));
        let processor = Processor::new(
            repo.clone(),
            Arc::new(FakeProbe(Ok(false))),
            Arc::new(SiblingTrackDiscovery::new()),
            Matcher::default(),
            Arc::new(FakeMuxer::default()),
        )
        .with_consumed_tracks(ConsumedTrackPolicy::Move);
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Movie.mkv"), b"video").unwrap();
        std::fs::write(dir.path().join("Movie.en.srt"), b"1\n").unwrap();
        Scanner::new(repo.clone(), "mkv").scan(dir.path()).await.unwrap();

        processor.process_next().await.unwrap();

        assert!(!dir.path().join("Movie.en.srt").exists());
        assert!(dir.path().join("Extra").join("Movie.en.srt").exists());
    }
}
