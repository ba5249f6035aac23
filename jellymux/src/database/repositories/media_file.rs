//! Media file repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::Result;
use crate::database::models::{FileStatus, MediaFileDbModel};
use crate::database::time::now_ms;

/// Media file repository trait.
///
/// Every method is a single statement keyed by path or id, so the scan loop
/// and the process loop never need a shared lock.
#[async_trait]
pub trait MediaFileRepository: Send + Sync {
    async fn get_by_path(&self, path: &str) -> Result<Option<MediaFileDbModel>>;
    /// Insert or re-queue `path` when it is new or its fingerprint changed.
    /// Returns `true` if a row was written.
    async fn upsert_observation(&self, path: &str, fingerprint: &str, checked_at: i64)
    -> Result<bool>;
    /// Move the oldest `waiting` record to `processing` and return it.
    async fn claim_next_waiting(&self) -> Result<Option<MediaFileDbModel>>;
    async fn set_h265(&self, id: i64, is_h265: bool) -> Result<()>;
    /// `processing -> processed`. A new fingerprint replaces the stored one.
    async fn mark_processed(&self, id: i64, fingerprint: Option<&str>) -> Result<bool>;
    /// `processing -> error`.
    async fn mark_error(&self, id: i64, message: &str) -> Result<bool>;
    /// `processing -> waiting` with the fingerprint found on disk, for a file
    /// that changed after it was scanned.
    async fn requeue_changed(&self, id: i64, fingerprint: &str, checked_at: i64) -> Result<bool>;
    /// Send records stuck in `processing` (interrupted run) back to `waiting`.
    async fn reset_interrupted(&self) -> Result<u64>;
    async fn list_all(&self) -> Result<Vec<MediaFileDbModel>>;
    async fn list_by_status(&self, status: FileStatus) -> Result<Vec<MediaFileDbModel>>;
    async fn count_by_status(&self) -> Result<Vec<(String, i64)>>;
}

/// SQLx implementation of MediaFileRepository.
pub struct SqlxMediaFileRepository {
    pool: SqlitePool,
}

impl SqlxMediaFileRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MediaFileRepository for SqlxMediaFileRepository {
    async fn get_by_path(&self, path: &str) -> Result<Option<MediaFileDbModel>> {
        let file =
            sqlx::query_as::<_, MediaFileDbModel>("SELECT * FROM media_file WHERE path = ?")
                .bind(path)
                .fetch_optional(&self.pool)
                .await?;
        Ok(file)
    }

    async fn upsert_observation(
        &self,
        path: &str,
        fingerprint: &str,
        checked_at: i64,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO media_file
                (path, fingerprint, status, status_message, is_h265, last_checked, updated_at)
            VALUES (?, ?, 'waiting', NULL, 0, ?, ?)
            ON CONFLICT(path) DO UPDATE SET
                fingerprint = excluded.fingerprint,
                status = 'waiting',
                status_message = NULL,
                last_checked = excluded.last_checked,
                updated_at = excluded.updated_at
            WHERE media_file.fingerprint <> excluded.fingerprint
            "#,
        )
        .bind(path)
        .bind(fingerprint)
        .bind(checked_at)
        .bind(checked_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn claim_next_waiting(&self) -> Result<Option<MediaFileDbModel>> {
        let file = sqlx::query_as::<_, MediaFileDbModel>(
            r#"
            UPDATE media_file
            SET status = 'processing', status_message = NULL, updated_at = ?
            WHERE id = (
                SELECT id FROM media_file
                WHERE status = 'waiting'
                ORDER BY last_checked, id
                LIMIT 1
            )
            RETURNING *
            "#,
        )
        .bind(now_ms())
        .fetch_optional(&self.pool)
        .await?;
        Ok(file)
    }

    async fn set_h265(&self, id: i64, is_h265: bool) -> Result<()> {
        sqlx::query("UPDATE media_file SET is_h265 = ?, updated_at = ? WHERE id = ?")
            .bind(is_h265)
            .bind(now_ms())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_processed(&self, id: i64, fingerprint: Option<&str>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE media_file SET
                status = 'processed',
                status_message = NULL,
                fingerprint = COALESCE(?, fingerprint),
                updated_at = ?
            WHERE id = ? AND status = 'processing'
            "#,
        )
        .bind(fingerprint)
        .bind(now_ms())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_error(&self, id: i64, message: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE media_file SET status = 'error', status_message = ?, updated_at = ?
            WHERE id = ? AND status = 'processing'
            "#,
        )
        .bind(message)
        .bind(now_ms())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn requeue_changed(&self, id: i64, fingerprint: &str, checked_at: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE media_file SET
                status = 'waiting',
                status_message = NULL,
                fingerprint = ?,
                last_checked = ?,
                updated_at = ?
            WHERE id = ? AND status = 'processing'
            "#,
        )
        .bind(fingerprint)
        .bind(checked_at)
        .bind(now_ms())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn reset_interrupted(&self) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE media_file SET status = 'waiting', updated_at = ? WHERE status = 'processing'",
        )
        .bind(now_ms())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn list_all(&self) -> Result<Vec<MediaFileDbModel>> {
        let files = sqlx::query_as::<_, MediaFileDbModel>("SELECT * FROM media_file ORDER BY path")
            .fetch_all(&self.pool)
            .await?;
        Ok(files)
    }

    async fn list_by_status(&self, status: FileStatus) -> Result<Vec<MediaFileDbModel>> {
        let files = sqlx::query_as::<_, MediaFileDbModel>(
            "SELECT * FROM media_file WHERE status = ? ORDER BY path",
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(files)
    }

    async fn count_by_status(&self) -> Result<Vec<(String, i64)>> {
        let counts = sqlx::query_as::<_, (String, i64)>(
            "SELECT status, COUNT(*) FROM media_file GROUP BY status ORDER BY status",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(counts)
    }
}
