// ==========================================
// 文件导入管道 - 作业生命周期跟踪接口
// ==========================================
// 职责: 定义核心消费的作业跟踪接口，并由 JobLogRepository 实现
// 说明: 核心只创建作业、追加明细、写终态、查询运行中作业
// ==========================================

use crate::domain::job::{ImportJob, JobState};
use crate::repository::error::RepositoryResult;
use crate::repository::job_log_repo::JobLogRepository;
use async_trait::async_trait;

// ==========================================
// JobTracker Trait
// ==========================================
// 实现者: JobLogRepository（SQLite job_log 表）
#[async_trait]
pub trait JobTracker: Send + Sync {
    /// 创建运行中作业，返回 job_id
    async fn initiate_job(&self, job_type: &str, description: &str) -> RepositoryResult<i64>;

    /// 追加明细条目
    async fn add_detail(&self, job_id: i64, label: &str, value: &str) -> RepositoryResult<()>;

    /// 以失败终态结束作业
    ///
    /// # 返回
    /// - Ok(false): 作业已是终态，本次忽略
    async fn kill_job(&self, job_id: i64, reason: &str, detail: Option<&str>)
        -> RepositoryResult<bool>;

    /// 以成功终态结束作业
    async fn stop_job(&self, job_id: i64, reason: &str) -> RepositoryResult<bool>;

    /// 类型标签在集合内且仍在运行的作业
    async fn is_running(&self, job_types: &[String]) -> RepositoryResult<Vec<ImportJob>>;
}

#[async_trait]
impl JobTracker for JobLogRepository {
    async fn initiate_job(&self, job_type: &str, description: &str) -> RepositoryResult<i64> {
        let job_id = JobLogRepository::initiate_job(self, job_type, description)?;
        tracing::info!(job_id, job_type = %job_type, "作业已创建");
        Ok(job_id)
    }

    async fn add_detail(&self, job_id: i64, label: &str, value: &str) -> RepositoryResult<()> {
        JobLogRepository::add_detail(self, job_id, label, value)
    }

    async fn kill_job(
        &self,
        job_id: i64,
        reason: &str,
        detail: Option<&str>,
    ) -> RepositoryResult<bool> {
        let applied = self.finish_job(job_id, JobState::Failed, reason, detail)?;
        if applied {
            tracing::warn!(job_id, reason = %reason, "作业以失败结束");
        }
        Ok(applied)
    }

    async fn stop_job(&self, job_id: i64, reason: &str) -> RepositoryResult<bool> {
        let applied = self.finish_job(job_id, JobState::Succeeded, reason, None)?;
        if applied {
            tracing::info!(job_id, reason = %reason, "作业成功结束");
        }
        Ok(applied)
    }

    async fn is_running(&self, job_types: &[String]) -> RepositoryResult<Vec<ImportJob>> {
        self.find_running(job_types)
    }
}
