// ==========================================
// 文件导入管道 - 导入队列条目
// ==========================================
// 职责: 异步导入的排队单元与其状态
// 说明: attempts 从 1 开始，每次因冲突重入队加 1
// ==========================================

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// 队列条目状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueStatus {
    /// 等待中（可能尚未到可执行时间）
    Pending,
    /// 已被 worker 领取
    Running,
    /// 已完成（无论导入结果如何）
    Completed,
    /// worker 捕获到异常
    Failed,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "PENDING",
            QueueStatus::Running => "RUNNING",
            QueueStatus::Completed => "COMPLETED",
            QueueStatus::Failed => "FAILED",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "PENDING" => QueueStatus::Pending,
            "RUNNING" => QueueStatus::Running,
            "COMPLETED" => QueueStatus::Completed,
            _ => QueueStatus::Failed,
        }
    }
}

/// 已上传文件（由宿主完成存储，这里只持有路径）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    /// 用户上传时的原始文件名
    pub filename: String,
    /// 落盘路径
    pub path: PathBuf,
}

impl UploadedFile {
    pub fn new(filename: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            filename: filename.into(),
            path: path.into(),
        }
    }
}

/// 导入队列条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedImport {
    pub task_id: String,
    pub queue_name: String,
    pub data_set: String,
    pub file: UploadedFile,
    pub status: QueueStatus,
    pub attempts: u32,
    pub available_at: String,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub error_message: Option<String>,
}

impl QueuedImport {
    /// 新建条目（立即可执行）
    pub fn new(queue_name: &str, data_set: &str, file: UploadedFile, now: &str) -> Self {
        Self {
            task_id: Uuid::new_v4().to_string(),
            queue_name: queue_name.to_string(),
            data_set: data_set.to_string(),
            file,
            status: QueueStatus::Pending,
            attempts: 1,
            available_at: now.to_string(),
            created_at: now.to_string(),
            started_at: None,
            completed_at: None,
            error_message: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_entry_starts_at_first_attempt() {
        let entry = QueuedImport::new(
            "file_import",
            "orders",
            UploadedFile::new("orders.csv", "/tmp/orders.csv"),
            "2024-01-01T00:00:00.000000Z",
        );
        assert_eq!(entry.attempts, 1);
        assert_eq!(entry.status, QueueStatus::Pending);
        assert_eq!(entry.available_at, entry.created_at);
        assert_eq!(QueueStatus::from_str(entry.status.as_str()), QueueStatus::Pending);
    }
}
