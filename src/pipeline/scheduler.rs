// ==========================================
// 文件导入管道 - 冲突感知调度器 (Conflict-Aware Scheduler)
// ==========================================
// 职责: 启动导入前检查冲突作业
// - 交互路径: 有冲突时返回"请稍候"跳转，不排队
// - 异步路径: 有冲突时延迟重入队；attempts 超过上限时升级通知并移出队列
// ==========================================
// 一致性: 冲突检查与作业创建不在同一事务内，两个 worker 可能同时看到"无冲突"。
//         这里接受该竞态，依靠作业类型唯一 + 重试退避收敛，不加全局锁
// ==========================================

use crate::config::config_manager::PipelineSettings;
use crate::config::dataset_config::{DatasetConfig, DatasetRegistry};
use crate::domain::outcome::ImportOutcome;
use crate::domain::queue::{QueuedImport, UploadedFile};
use crate::domain::types::CallerOrigin;
use crate::notify::failure_processor::FailureProcessor;
use crate::notify::template::{TemplateId, REPROCESS_PATH_PREFIX};
use crate::pipeline::error::{panic_message, PipelineError, PipelineResult};
use crate::pipeline::orchestrator::{ImportOrchestrator, ImportRequest};
use crate::pipeline::tracker::JobTracker;
use crate::repository::import_queue_repo::ImportQueueRepository;
use crate::repository::sql_value::now_timestamp;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

/// 准入判定
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    /// 冲突集中仍有运行中的作业
    Blocked { job_ids: Vec<i64> },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed)
    }

    pub fn blocking_jobs(&self) -> &[i64] {
        match self {
            Admission::Allowed => &[],
            Admission::Blocked { job_ids } => job_ids,
        }
    }
}

/// 交互路径的响应
#[derive(Debug, Clone, PartialEq)]
pub enum InteractiveResponse {
    /// 有冲突: 跳转到重新上传页面，附带建议等待时长与阻塞作业
    Redirect {
        url: String,
        job_ids: Vec<i64>,
        wait_secs: u64,
    },
    Outcome(ImportOutcome),
}

/// 一次异步执行的处理方式
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptAction {
    /// 有冲突，延迟重入队
    Released { blocking: Vec<i64>, next_attempt: u32 },
    /// 超过重试上限且仍有冲突，移出队列
    Removed { blocking: Vec<i64> },
    /// 已执行导入
    Ran(ImportOutcome),
    /// 执行边界捕获到错误或 panic
    Crashed(String),
}

/// 一次异步执行的结果
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptResult {
    pub task_id: String,
    pub attempts: u32,
    /// 本次是否发送了升级通知
    pub escalated: bool,
    pub action: AttemptAction,
}

// ==========================================
// ConflictScheduler
// ==========================================
pub struct ConflictScheduler {
    datasets: Arc<DatasetRegistry>,
    tracker: Arc<dyn JobTracker>,
    queue: Arc<ImportQueueRepository>,
    orchestrator: Arc<ImportOrchestrator>,
    notifications: Arc<FailureProcessor>,
    wait_time: Duration,
    max_attempts: u32,
}

impl ConflictScheduler {
    pub fn new(
        datasets: Arc<DatasetRegistry>,
        tracker: Arc<dyn JobTracker>,
        queue: Arc<ImportQueueRepository>,
        orchestrator: Arc<ImportOrchestrator>,
        notifications: Arc<FailureProcessor>,
        settings: &PipelineSettings,
    ) -> Self {
        Self {
            datasets,
            tracker,
            queue,
            orchestrator,
            notifications,
            wait_time: settings.wait_time,
            max_attempts: settings.max_attempts,
        }
    }

    pub fn queue(&self) -> &ImportQueueRepository {
        &self.queue
    }

    /// 冲突集中是否有运行中的作业
    pub async fn may_run_now(&self, conflict_set: &[String]) -> PipelineResult<Admission> {
        let running = self.tracker.is_running(conflict_set).await?;
        if running.is_empty() {
            return Ok(Admission::Allowed);
        }
        let job_ids = running.iter().map(|job| job.job_id).collect();
        Ok(Admission::Blocked { job_ids })
    }

    /// 交互路径: 有冲突立即返回跳转，否则内联执行导入
    #[instrument(skip(self, file, origin), fields(filename = %file.filename))]
    pub async fn run_interactive(
        &self,
        data_set: &str,
        file: UploadedFile,
        origin: CallerOrigin,
    ) -> PipelineResult<InteractiveResponse> {
        let dataset = self.datasets.get(data_set)?;

        if let Admission::Blocked { job_ids } = self.may_run_now(&dataset.conflict_set()).await? {
            let wait_secs = self.wait_time.as_secs();
            let url = self.redirect_url(dataset, wait_secs, &job_ids);
            info!(blocking = ?job_ids, wait_secs, "存在冲突导入，提示稍后重试");
            return Ok(InteractiveResponse::Redirect {
                url,
                job_ids,
                wait_secs,
            });
        }

        let request = ImportRequest::interactive(data_set, file, origin);
        let outcome = self.orchestrator.run_file_import(&request).await?;
        Ok(InteractiveResponse::Outcome(outcome))
    }

    /// 异步路径: 加入数据集对应的队列
    ///
    /// # 返回
    /// - Ok(String): task_id
    pub fn enqueue(&self, data_set: &str, file: UploadedFile) -> PipelineResult<String> {
        let dataset = self.datasets.get(data_set)?;
        let entry = QueuedImport::new(&dataset.queue, data_set, file, &now_timestamp());
        Ok(self.queue.enqueue(&entry)?)
    }

    /// 处理一条已领取的队列任务
    ///
    /// 顺序: 冲突检查 -> (attempts 超限时)升级通知 -> 重入队/移出/执行
    #[instrument(skip(self, task), fields(task_id = %task.task_id, attempts = task.attempts))]
    pub async fn handle_queued(&self, task: QueuedImport) -> AttemptResult {
        let (escalated, action) = self.attempt(&task).await;
        AttemptResult {
            task_id: task.task_id,
            attempts: task.attempts,
            escalated,
            action,
        }
    }

    async fn attempt(&self, task: &QueuedImport) -> (bool, AttemptAction) {
        let dataset = match self.datasets.get(&task.data_set) {
            Ok(dataset) => dataset,
            Err(e) => return (false, self.crash(task, e.to_string())),
        };

        let admission = match self.may_run_now(&dataset.conflict_set()).await {
            Ok(admission) => admission,
            Err(e) => return (false, self.crash(task, e.to_string())),
        };

        let escalated = task.attempts > self.max_attempts;
        if escalated {
            self.notifications
                .escalation(dataset, &task.file, admission.blocking_jobs(), self.wait_time)
                .await;
        }

        let action = match admission {
            Admission::Blocked { job_ids } if escalated => self.remove(task, dataset, &job_ids),
            Admission::Blocked { job_ids } => self.release(task, job_ids),
            Admission::Allowed => self.run_guarded(task).await,
        };
        (escalated, action)
    }

    fn release(&self, task: &QueuedImport, blocking: Vec<i64>) -> AttemptAction {
        match self.queue.release(&task.task_id, self.wait_time) {
            Ok(next_attempt) => {
                info!(
                    blocking = ?blocking,
                    next_attempt,
                    wait_secs = self.wait_time.as_secs(),
                    "存在冲突导入，延迟重入队"
                );
                AttemptAction::Released {
                    blocking,
                    next_attempt,
                }
            }
            Err(e) => self.crash(task, e.to_string()),
        }
    }

    fn remove(&self, task: &QueuedImport, dataset: &DatasetConfig, blocking: &[i64]) -> AttemptAction {
        let reason = format!("超过重试上限 {} 次，仍有冲突作业 {:?}", self.max_attempts, blocking);
        warn!(data_set = %dataset.name, blocking = ?blocking, "导入移出队列");
        if let Err(e) = self.queue.fail(&task.task_id, &reason) {
            error!(error = %e, "队列状态写入失败");
        }
        AttemptAction::Removed {
            blocking: blocking.to_vec(),
        }
    }

    // 执行边界: 编排器的错误和 panic 都降级为日志 + 队列失败标记
    // 作业自身的失败终态由编排器写入
    async fn run_guarded(&self, task: &QueuedImport) -> AttemptAction {
        let request = ImportRequest::queued(&task.data_set, task.file.clone());
        let run = AssertUnwindSafe(self.orchestrator.run_file_import(&request)).catch_unwind();

        let outcome = match run.await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => return self.crash(task, e.to_string()),
            Err(panic) => {
                let message = PipelineError::Panicked(panic_message(panic.as_ref())).to_string();
                return self.crash(task, message);
            }
        };

        if let Err(e) = self.queue.complete(&task.task_id) {
            error!(error = %e, "队列状态写入失败");
        }
        info!(kind = %outcome.kind, job_id = ?outcome.job_id, "队列导入执行完毕");
        AttemptAction::Ran(outcome)
    }

    fn crash(&self, task: &QueuedImport, message: String) -> AttemptAction {
        error!(task_id = %task.task_id, error = %message, "队列导入执行失败");
        if let Err(e) = self.queue.fail(&task.task_id, &message) {
            error!(error = %e, "队列状态写入失败");
        }
        AttemptAction::Crashed(message)
    }

    // file-transfer/<slug>?wait_time=<secs>&job_ids[]=<id>...
    fn redirect_url(&self, dataset: &DatasetConfig, wait_secs: u64, job_ids: &[i64]) -> String {
        let template_id = TemplateId::dataset(dataset.failure_template_name());
        let path = self
            .notifications
            .templates()
            .get(&template_id)
            .ok()
            .and_then(|t| t.reprocess_path())
            .unwrap_or_else(|| format!("{}/{}", REPROCESS_PATH_PREFIX, dataset.name));

        let mut url = format!("{}?wait_time={}", path, wait_secs);
        for id in job_ids {
            url.push_str(&format!("&job_ids[]={}", id));
        }
        url
    }
}

