// ==========================================
// 文件导入管道 - 导入队列 Repository
// ==========================================
// 职责: 管理异步导入队列（入队、到期领取、延迟重入队、完成）
// 说明: 重入队不是阻塞等待，当前执行单元结束，延迟到期后由
//       任意 worker 重新领取
// ==========================================

use crate::domain::queue::{QueueStatus, QueuedImport, UploadedFile};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::sql_value::{now_timestamp, timestamp};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const SELECT_COLUMNS: &str = "task_id, queue_name, data_set, filename, file_path, status, attempts, \
     available_at, created_at, started_at, completed_at, error_message";

// ==========================================
// ImportQueueRepository
// ==========================================
pub struct ImportQueueRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ImportQueueRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn lock(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn map_entry(row: &Row<'_>) -> rusqlite::Result<QueuedImport> {
        let status: String = row.get(5)?;
        let file_path: String = row.get(4)?;
        let attempts: i64 = row.get(6)?;
        Ok(QueuedImport {
            task_id: row.get(0)?,
            queue_name: row.get(1)?,
            data_set: row.get(2)?,
            file: UploadedFile {
                filename: row.get(3)?,
                path: PathBuf::from(file_path),
            },
            status: QueueStatus::from_str(&status),
            attempts: attempts.max(0) as u32,
            available_at: row.get(7)?,
            created_at: row.get(8)?,
            started_at: row.get(9)?,
            completed_at: row.get(10)?,
            error_message: row.get(11)?,
        })
    }

    /// 入队
    ///
    /// # 返回
    /// - Ok(String): task_id
    pub fn enqueue(&self, entry: &QueuedImport) -> RepositoryResult<String> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO import_queue (
                task_id, queue_name, data_set, filename, file_path, status,
                attempts, available_at, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                entry.task_id,
                entry.queue_name,
                entry.data_set,
                entry.file.filename,
                entry.file.path.to_string_lossy().to_string(),
                entry.status.as_str(),
                entry.attempts,
                entry.available_at,
                entry.created_at,
            ],
        )?;

        tracing::info!(
            task_id = %entry.task_id,
            queue = %entry.queue_name,
            data_set = %entry.data_set,
            "导入任务已加入队列"
        );
        Ok(entry.task_id.clone())
    }

    /// 领取一个已到期的等待任务并标记为 RUNNING
    ///
    /// 领取在 IMMEDIATE 事务中完成，多个 worker 不会领到同一条
    pub fn claim_due(&self, queue_name: &str) -> RepositoryResult<Option<QueuedImport>> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        let now = now_timestamp();
        let sql = format!(
            "SELECT {} FROM import_queue
             WHERE queue_name = ?1 AND status = 'PENDING' AND available_at <= ?2
             ORDER BY available_at ASC, created_at ASC
             LIMIT 1",
            SELECT_COLUMNS
        );
        let entry = tx
            .query_row(&sql, params![queue_name, now], Self::map_entry)
            .optional()?;

        let entry = match entry {
            Some(mut entry) => {
                tx.execute(
                    "UPDATE import_queue SET status = 'RUNNING', started_at = ?1 WHERE task_id = ?2",
                    params![now, entry.task_id],
                )?;
                entry.status = QueueStatus::Running;
                entry.started_at = Some(now);
                Some(entry)
            }
            None => None,
        };

        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        Ok(entry)
    }

    /// 延迟重入队，attempts 加 1
    ///
    /// # 返回
    /// - Ok(u32): 重入队后的 attempts
    pub fn release(&self, task_id: &str, delay: Duration) -> RepositoryResult<u32> {
        let conn = self.lock()?;
        let delay = chrono::Duration::from_std(delay)
            .map_err(|e| RepositoryError::Other(anyhow::anyhow!(e)))?;
        let available_at = timestamp(Utc::now() + delay);

        let updated = conn.execute(
            "UPDATE import_queue
             SET status = 'PENDING', attempts = attempts + 1, available_at = ?1, started_at = NULL
             WHERE task_id = ?2",
            params![available_at, task_id],
        )?;
        if updated == 0 {
            return Err(RepositoryError::NotFound {
                entity: "QueuedImport".to_string(),
                id: task_id.to_string(),
            });
        }

        let attempts: i64 = conn.query_row(
            "SELECT attempts FROM import_queue WHERE task_id = ?1",
            [task_id],
            |row| row.get(0),
        )?;

        tracing::info!(
            task_id = %task_id,
            attempts = attempts,
            available_at = %available_at,
            "导入任务延迟重入队"
        );
        Ok(attempts.max(0) as u32)
    }

    /// 标记完成
    pub fn complete(&self, task_id: &str) -> RepositoryResult<()> {
        self.finish(task_id, QueueStatus::Completed, None)
    }

    /// 标记失败
    pub fn fail(&self, task_id: &str, error: &str) -> RepositoryResult<()> {
        self.finish(task_id, QueueStatus::Failed, Some(error))
    }

    fn finish(&self, task_id: &str, status: QueueStatus, error: Option<&str>) -> RepositoryResult<()> {
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE import_queue SET status = ?1, completed_at = ?2, error_message = ?3 WHERE task_id = ?4",
            params![status.as_str(), now_timestamp(), error, task_id],
        )?;
        if updated == 0 {
            return Err(RepositoryError::NotFound {
                entity: "QueuedImport".to_string(),
                id: task_id.to_string(),
            });
        }
        Ok(())
    }

    pub fn get(&self, task_id: &str) -> RepositoryResult<QueuedImport> {
        let conn = self.lock()?;
        let sql = format!("SELECT {} FROM import_queue WHERE task_id = ?1", SELECT_COLUMNS);
        conn.query_row(&sql, [task_id], Self::map_entry)
            .optional()?
            .ok_or_else(|| RepositoryError::NotFound {
                entity: "QueuedImport".to_string(),
                id: task_id.to_string(),
            })
    }

    /// 等待中的任务数（含未到期）
    pub fn count_pending(&self, queue_name: &str) -> RepositoryResult<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM import_queue WHERE queue_name = ?1 AND status = 'PENDING'",
            [queue_name],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as usize)
    }
}
