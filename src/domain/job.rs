// ==========================================
// 文件导入管道 - 导入作业 (ImportJob)
// ==========================================
// 职责: 作业生命周期状态、作业类型标签、明细条目
// 说明: 作业由 JobTracker 持有，核心只读取与写入终态
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

/// 作业类型标签前缀
pub const JOB_TYPE_PREFIX: &str = "Upload - ";

/// 由暂存表名确定性地派生作业类型标签
///
/// 同一数据集的两次上传得到同一标签，冲突检测依赖这一点
pub fn job_type_label(staging_table: &str) -> String {
    format!("{}{}", JOB_TYPE_PREFIX, staging_table)
}

// ==========================================
// 作业状态 (Job State)
// ==========================================
// 唯一合法的终态: Succeeded / Failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Running,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Running => "RUNNING",
            JobState::Succeeded => "SUCCEEDED",
            JobState::Failed => "FAILED",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "RUNNING" => JobState::Running,
            "SUCCEEDED" => JobState::Succeeded,
            _ => JobState::Failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobState::Running)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 作业明细条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDetail {
    pub label: String,
    pub value: String,
    pub created_at: String,
}

/// 导入作业
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportJob {
    pub job_id: i64,
    pub job_type: String,
    pub description: String,
    pub state: JobState,
    /// 终态原因（kill/stop 时写入）
    pub reason: Option<String>,
    /// 终态附加信息
    pub detail: Option<String>,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub details: Vec<JobDetail>,
}

impl ImportJob {
    pub fn is_running(&self) -> bool {
        self.state == JobState::Running
    }
}
