//! Service container.
//!
//! Holds the pipeline components and owns the two background loops: the
//! scanner on a slow timer and the processor on a fast one. They share
//! nothing but the store.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::database::repositories::{MediaFileRepository, SqlxMediaFileRepository};
use crate::matcher::Matcher;
use crate::muxer::MkvMerge;
use crate::probe::FfprobeProbe;
use crate::processor::{ProcessOutcome, Processor};
use crate::scanner::Scanner;
use crate::tracks::SiblingTrackDiscovery;
use crate::Result;

/// Default shutdown timeout.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Service container holding the pipeline.
pub struct ServiceContainer {
    /// Database connection pool.
    pub pool: SqlitePool,
    pub media_files: Arc<dyn MediaFileRepository>,
    scanner: Arc<Scanner>,
    processor: Arc<Processor>,
    scan_root: PathBuf,
    scan_interval: Duration,
    process_interval: Duration,
    tasks: JoinSet<()>,
    cancellation_token: CancellationToken,
}

impl ServiceContainer {
    /// Build the pipeline with the real tools from `config`.
    pub fn new(pool: SqlitePool, config: &AppConfig) -> Self {
        let media_files: Arc<dyn MediaFileRepository> =
            Arc::new(SqlxMediaFileRepository::new(pool.clone()));
        let processor = Processor::new(
            media_files.clone(),
            Arc::new(FfprobeProbe::new(&config.ffprobe_path, config.tool_timeout)),
            Arc::new(SiblingTrackDiscovery::new()),
            Matcher::new(config.max_fuzzy_distance),
            Arc::new(MkvMerge::new(&config.mkvmerge_path, config.tool_timeout)),
        )
        .with_consumed_tracks(config.consumed_tracks);

        Self::with_components(pool, media_files, processor, config)
    }

    /// Build around an already assembled processor.
    pub fn with_components(
        pool: SqlitePool,
        media_files: Arc<dyn MediaFileRepository>,
        processor: Processor,
        config: &AppConfig,
    ) -> Self {
        Self {
            scanner: Arc::new(Scanner::new(
                media_files.clone(),
                config.video_extension.clone(),
            )),
            processor: Arc::new(processor),
            pool,
            media_files,
            scan_root: config.scan_root.clone(),
            scan_interval: config.scan_interval,
            process_interval: config.process_interval,
            tasks: JoinSet::new(),
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Recover from an unclean shutdown and start both loops.
    pub async fn initialize(&mut self) -> Result<()> {
        let reset = self.media_files.reset_interrupted().await?;
        if reset > 0 {
            warn!(count = reset, "Requeued files left in processing by a previous run");
        }

        self.start_scan_loop();
        self.start_process_loop();
        info!(
            root = %self.scan_root.display(),
            scan_interval_secs = self.scan_interval.as_secs(),
            process_interval_secs = self.process_interval.as_secs(),
            "Services initialized"
        );
        Ok(())
    }

    fn start_scan_loop(&mut self) {
        let scanner = self.scanner.clone();
        let root = self.scan_root.clone();
        let interval = self.scan_interval;
        let token = self.cancellation_token.clone();

        self.tasks.spawn(async move {
            debug!("Scan loop started");
            loop {
                // A failed pass is logged and retried on the next tick.
                if let Err(e) = scanner.scan(&root).await {
                    error!(root = %root.display(), error = %e, "Scan failed");
                }

                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
            info!("Scan loop shutting down");
        });
    }

    fn start_process_loop(&mut self) {
        let processor = self.processor.clone();
        let interval = self.process_interval;
        let token = self.cancellation_token.clone();

        self.tasks.spawn(async move {
            debug!("Process loop started");
            loop {
                match processor.process_next().await {
                    Ok(Some(ProcessOutcome::Failed { path, message })) => {
                        debug!(%path, %message, "File moved to error");
                    }
                    Ok(_) => {}
                    Err(e) => error!(error = %e, "Processing step failed"),
                }

                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
            info!("Process loop shutting down");
        });
    }

    /// Get the cancellation token for external use.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Check if shutdown has been requested.
    pub fn is_shutting_down(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    /// Shutdown all services gracefully.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.shutdown_with_timeout(DEFAULT_SHUTDOWN_TIMEOUT).await
    }

    /// Stop both loops, waiting up to `timeout` for the current step to end.
    pub async fn shutdown_with_timeout(&mut self, timeout: Duration) -> Result<()> {
        info!("Shutting down services (timeout: {:?})", timeout);
        self.cancellation_token.cancel();

        let tasks = &mut self.tasks;
        let drained = tokio::time::timeout(timeout, async {
            while let Some(result) = tasks.join_next().await {
                if let Err(e) = result {
                    warn!(error = %e, "Background task ended abnormally");
                }
            }
        })
        .await;

        if drained.is_err() {
            warn!("Shutdown timeout reached, aborting background tasks");
            self.tasks.abort_all();
        }

        info!("Closing database pool...");
        self.pool.close().await;

        info!("Services shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::FileStatus;
    use crate::database::test_pool;
    use crate::muxer::Muxer;
    use crate::probe::CodecProbe;
    use crate::tracks::Track;
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};

    struct H264;

    #[async_trait]
    impl CodecProbe for H264 {
        async fn is_h265(&self, _path: &Path) -> Result<bool> {
            Ok(false)
        }
    }

    struct NoopMuxer;

    #[async_trait]
    impl Muxer for NoopMuxer {
        async fn mux(
            &self,
            _video_path: &Path,
            _tracks: &[Track],
            _attachments: &[PathBuf],
        ) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_loops_process_files_and_stop() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Movie.mkv"), b"video").unwrap();

        let pool = test_pool().await;
        let media_files: Arc<dyn MediaFileRepository> =
            Arc::new(SqlxMediaFileRepository::new(pool.clone()));
        let config = AppConfig {
            scan_root: dir.path().to_path_buf(),
            scan_interval: Duration::from_secs(60),
            process_interval: Duration::from_millis(20),
            ..Default::default()
        };
        let processor = Processor::new(
            media_files.clone(),
            Arc::new(H264),
            Arc::new(SiblingTrackDiscovery::new()),
            Matcher::default(),
            Arc::new(NoopMuxer),
        );
        let mut services =
            ServiceContainer::with_components(pool, media_files.clone(), processor, &config);

        services.initialize().await.unwrap();

        let path = dir.path().join("Movie.mkv").to_string_lossy().into_owned();
        let mut status = None;
        for _ in 0..100 {
            status = media_files
                .get_by_path(&path)
                .await
                .unwrap()
                .and_then(|r| r.file_status());
            if status == Some(FileStatus::Processed) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(status, Some(FileStatus::Processed));

        services
            .shutdown_with_timeout(Duration::from_secs(5))
            .await
            .unwrap();
        assert!(services.is_shutting_down());
    }

    #[tokio::test]
    async fn test_initialize_requeues_interrupted_files() {
        let pool = test_pool().await;
        let media_files: Arc<dyn MediaFileRepository> =
            Arc::new(SqlxMediaFileRepository::new(pool.clone()));
        media_files
            .upsert_observation("/gone/Movie.mkv", "fp", 0)
            .await
            .unwrap();
        media_files.claim_next_waiting().await.unwrap();

        let config = AppConfig {
            scan_root: PathBuf::from("/gone"),
            scan_interval: Duration::from_secs(60),
            process_interval: Duration::from_secs(60),
            ..Default::default()
        };
        let processor = Processor::new(
            media_files.clone(),
            Arc::new(H264),
            Arc::new(SiblingTrackDiscovery::new()),
            Matcher::default(),
            Arc::new(NoopMuxer),
        );
        let mut services =
            ServiceContainer::with_components(pool, media_files.clone(), processor, &config);

        services.initialize().await.unwrap();

        // Requeued, then picked up by the process loop and failed because
        // the file does not exist.
        let mut status = None;
        for _ in 0..100 {
            status = media_files
                .get_by_path("/gone/Movie.mkv")
                .await
                .unwrap()
                .and_then(|r| r.file_status());
            if status == Some(FileStatus::Error) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(status, Some(FileStatus::Error));

        services
            .shutdown_with_timeout(Duration::from_secs(5))
            .await
            .unwrap();
    }
}
