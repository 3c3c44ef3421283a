// ==========================================
// 文件导入管道 - 导入编排器 (Import Orchestrator)
// ==========================================
// 职责: 暂存 -> 校验 -> 落库，产出统一的导入终态
// 状态: Staging -> Validating -> Loading ->
//       {Succeeded, Failed-Staging, Failed-Validation, Failed-Load, Failed-Empty}
// ==========================================
// 约束:
// - 单次调用内不重试；重试由调度器以新的调用完成
// - 阶段严格串行，前一阶段结果完整后才进入下一阶段
// - 阶段内错误在阶段边界转为终态，不向上抛出
// - 阶段内 panic 先给作业写失败终态，再以 Panicked 返回
// ==========================================

use crate::comparison::engine::ComparisonEngine;
use crate::config::config_manager::PipelineSettings;
use crate::config::dataset_config::{DatasetConfig, DatasetRegistry};
use crate::domain::comparison::ValidationFailures;
use crate::domain::outcome::{views, ImportOutcome, OutcomeKind, TableStatus};
use crate::domain::queue::UploadedFile;
use crate::domain::staging::StagingResult;
use crate::domain::types::{CallerOrigin, STATUS_BAD_REQUEST, STATUS_OK};
use crate::i18n::{t, t_with_args};
use crate::importer::staging_loader::{detail_labels, StagingLoader};
use crate::notify::failure_processor::FailureProcessor;
use crate::pipeline::error::{panic_message, PipelineError, PipelineResult};
use crate::pipeline::loader::LoaderRegistry;
use crate::pipeline::tracker::JobTracker;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

/// 一次导入请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRequest {
    pub data_set: String,
    pub file: UploadedFile,
    pub origin: CallerOrigin,
    /// true: 由队列 worker 执行（异步路径）
    pub queued: bool,
}

impl ImportRequest {
    pub fn interactive(data_set: &str, file: UploadedFile, origin: CallerOrigin) -> Self {
        Self {
            data_set: data_set.to_string(),
            file,
            origin,
            queued: false,
        }
    }

    pub fn queued(data_set: &str, file: UploadedFile) -> Self {
        Self {
            data_set: data_set.to_string(),
            file,
            origin: CallerOrigin::Api,
            queued: true,
        }
    }
}

// ==========================================
// ImportOrchestrator
// ==========================================
pub struct ImportOrchestrator {
    datasets: Arc<DatasetRegistry>,
    tracker: Arc<dyn JobTracker>,
    staging: StagingLoader,
    engine: Arc<ComparisonEngine>,
    loaders: Arc<LoaderRegistry>,
    notifications: Arc<FailureProcessor>,
    staging_timeout: Duration,
    continue_queued_after_staging_failure: bool,
}

impl ImportOrchestrator {
    pub fn new(
        datasets: Arc<DatasetRegistry>,
        tracker: Arc<dyn JobTracker>,
        staging: StagingLoader,
        engine: Arc<ComparisonEngine>,
        loaders: Arc<LoaderRegistry>,
        notifications: Arc<FailureProcessor>,
        settings: &PipelineSettings,
    ) -> Self {
        Self {
            datasets,
            tracker,
            staging,
            engine,
            loaders,
            notifications,
            staging_timeout: settings.staging_timeout,
            continue_queued_after_staging_failure: settings.continue_queued_after_staging_failure,
        }
    }

    /// 执行一次文件导入
    ///
    /// # 返回
    /// - Ok(ImportOutcome): 任一终态（包括各类失败）
    /// - Err: 数据集未配置或作业无法创建，导入未开始；
    ///   或阶段内 panic（作业已标记失败）
    #[instrument(skip(self, request), fields(data_set = %request.data_set, queued = request.queued))]
    pub async fn run_file_import(&self, request: &ImportRequest) -> PipelineResult<ImportOutcome> {
        let dataset = self.datasets.get(&request.data_set)?;
        let file = &request.file;

        let description = t_with_args(
            "import.job_description",
            &[("filename", &file.filename), ("table", &dataset.staging_table)],
        );
        let job_id = self
            .tracker
            .initiate_job(&dataset.job_type(), &description)
            .await?;
        info!(job_id, filename = %file.filename, "导入开始");

        // 阶段内 panic 同样落为作业失败终态
        let phases = AssertUnwindSafe(self.run_phases(job_id, dataset, request)).catch_unwind();
        match phases.await {
            Ok(outcome) => Ok(outcome),
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(job_id, error = %message, "导入异常终止");
                let reason = t_with_args("import.crashed", &[("error", &message)]);
                self.finish_failed(job_id, &reason, None).await;
                Err(PipelineError::Panicked(message))
            }
        }
    }

    async fn run_phases(
        &self,
        job_id: i64,
        dataset: &DatasetConfig,
        request: &ImportRequest,
    ) -> ImportOutcome {
        let file = &request.file;

        // ===== 1. 暂存 =====
        let staging = self.stage(job_id, dataset, file).await;
        if !staging.is_success() {
            let outcome = self.fail_staging(job_id, file, &staging).await;
            if !(request.queued && self.continue_queued_after_staging_failure) {
                return outcome;
            }
            warn!(job_id, "暂存失败后继续校验（异步路径）");
        }

        // ===== 2. 校验 =====
        let running = t_with_args("import.phase_comparisons", &[("filename", &file.filename)]);
        self.record_detail(job_id, detail_labels::COMPARISONS, &running)
            .await;
        let failures = self.engine.run_all(&dataset.name).await;
        if !failures.is_empty() {
            return self
                .fail_validation(job_id, dataset, request, &failures)
                .await;
        }

        // ===== 3. 落库 =====
        let loading = t_with_args("import.phase_load", &[("table", &dataset.staging_table)]);
        self.record_detail(job_id, detail_labels::LOAD, &loading).await;
        self.load(job_id, dataset, request).await
    }

    async fn stage(&self, job_id: i64, dataset: &DatasetConfig, file: &UploadedFile) -> StagingResult {
        let staging = self.staging.stage_file(
            job_id,
            &file.path,
            &dataset.staging_table,
            dataset.insert_tolerance,
        );
        match tokio::time::timeout(self.staging_timeout, staging).await {
            Ok(result) => result,
            Err(_) => {
                let secs = self.staging_timeout.as_secs();
                error!(job_id, secs, "暂存超时");
                StagingResult::fatal(t_with_args(
                    "import.staging_timeout",
                    &[("secs", &secs.to_string())],
                ))
            }
        }
    }

    async fn fail_staging(
        &self,
        job_id: i64,
        file: &UploadedFile,
        staging: &StagingResult,
    ) -> ImportOutcome {
        warn!(
            job_id,
            status = staging.status.code(),
            errored = staging.outcome.errored,
            "暂存失败"
        );
        self.notifications.staging_failure(file, staging).await;

        let content = staging.content();
        let detail = content.to_string();
        self.finish_failed(job_id, &staging.message, Some(&detail)).await;

        ImportOutcome {
            kind: OutcomeKind::StagingFailed,
            message: staging.message.clone(),
            content,
            status: staging.status.code(),
            view: None,
            job_id: Some(job_id),
        }
    }

    async fn fail_validation(
        &self,
        job_id: i64,
        dataset: &DatasetConfig,
        request: &ImportRequest,
        failures: &ValidationFailures,
    ) -> ImportOutcome {
        let failed: Vec<&str> = failures.keys().map(|k| k.as_str()).collect();
        warn!(job_id, failed = ?failed, "校验未通过");

        self.notifications
            .validation_failures(dataset, &request.file, failures)
            .await;

        let message = t_with_args(
            "import.validation_failed",
            &[("filename", &request.file.filename)],
        );
        let aborted = t("import.validation_aborted");
        self.finish_failed(job_id, &message, Some(&aborted)).await;

        ImportOutcome {
            kind: OutcomeKind::ValidationFailed,
            message,
            content: serde_json::to_value(failures).unwrap_or(serde_json::Value::Null),
            status: STATUS_BAD_REQUEST,
            view: view_for(request.origin, views::COMPARISON_FAIL),
            job_id: Some(job_id),
        }
    }

    async fn load(
        &self,
        job_id: i64,
        dataset: &DatasetConfig,
        request: &ImportRequest,
    ) -> ImportOutcome {
        let statuses = match self.loaders.get(&dataset.name) {
            Some(loader) => match loader.commit().await {
                Ok(statuses) => statuses,
                Err(e) => {
                    error!(job_id, error = %e, "落库失败");
                    return self
                        .fail_load(job_id, dataset, request, &e.to_string())
                        .await;
                }
            },
            None => {
                let message = t_with_args("import.load_missing_loader", &[("dataset", &dataset.name)]);
                error!(job_id, "落库实现未注册");
                return self.fail_load(job_id, dataset, request, &message).await;
            }
        };

        let (head, rest) = match statuses.split_first() {
            Some(split) => split,
            None => {
                let message = t("import.load_no_status");
                return self.fail_load(job_id, dataset, request, &message).await;
            }
        };

        // 交互路径只处理第一个状态；异步路径处理全部状态，返回第一个终态
        let outcome = self.handle_status(job_id, dataset, request, head).await;
        if request.queued {
            for status in rest {
                self.handle_status(job_id, dataset, request, status).await;
            }
        }
        outcome
    }

    async fn handle_status(
        &self,
        job_id: i64,
        dataset: &DatasetConfig,
        request: &ImportRequest,
        status: &TableStatus,
    ) -> ImportOutcome {
        let readable = dataset.readable_name.as_str();
        let table = status.table.as_deref().unwrap_or(&dataset.staging_table);

        if status.success {
            info!(job_id, table = %table, "落库成功");
            self.notifications.success(dataset).await;
            let message = t_with_args("import.load_succeeded", &[("readable", readable)]);
            if let Err(e) = self.tracker.stop_job(job_id, &message).await {
                warn!(job_id, error = %e, "作业终态写入失败");
            }
            return ImportOutcome {
                kind: OutcomeKind::LoadSucceeded,
                message,
                content: status.content.clone(),
                status: STATUS_OK,
                view: view_for(request.origin, views::SUCCESS),
                job_id: Some(job_id),
            };
        }

        if status.empty {
            warn!(job_id, table = %table, "文件无数据");
            self.notifications.load_failure(&request.file, true).await;
            let message = t_with_args("import.load_failed_empty", &[("readable", readable)]);
            self.finish_failed(job_id, &message, status.message.as_deref())
                .await;
            return ImportOutcome {
                kind: OutcomeKind::LoadFailedEmpty,
                message,
                content: status.content.clone(),
                status: STATUS_BAD_REQUEST,
                view: view_for(request.origin, views::LOAD_FAIL),
                job_id: Some(job_id),
            };
        }

        warn!(job_id, table = %table, message = ?status.message, "落库未处理");
        self.notifications.load_failure(&request.file, false).await;
        let message = t_with_args("import.load_failed", &[("readable", readable)]);
        self.finish_failed(job_id, &message, status.message.as_deref())
            .await;
        // 没有结构化内容时把落库方给出的原因放进 content
        let content = match (&status.content, &status.message) {
            (serde_json::Value::Null, Some(reason)) => serde_json::Value::String(reason.clone()),
            (content, _) => content.clone(),
        };
        ImportOutcome {
            kind: OutcomeKind::LoadFailedOther,
            message,
            content,
            status: STATUS_BAD_REQUEST,
            view: view_for(request.origin, views::LOAD_FAIL),
            job_id: Some(job_id),
        }
    }

    // 落库实现缺失、报错或未返回任何状态
    async fn fail_load(
        &self,
        job_id: i64,
        dataset: &DatasetConfig,
        request: &ImportRequest,
        reason: &str,
    ) -> ImportOutcome {
        let status = TableStatus::unprocessed(&dataset.staging_table, reason);
        self.handle_status(job_id, dataset, request, &status).await
    }

    async fn record_detail(&self, job_id: i64, label: &str, value: &str) {
        if let Err(e) = self.tracker.add_detail(job_id, label, value).await {
            warn!(job_id, label = %label, error = %e, "作业明细写入失败");
        }
    }

    async fn finish_failed(&self, job_id: i64, reason: &str, detail: Option<&str>) {
        if let Err(e) = self.tracker.kill_job(job_id, reason, detail).await {
            warn!(job_id, error = %e, "作业终态写入失败");
        }
    }
}

fn view_for(origin: CallerOrigin, view: &str) -> Option<String> {
    origin.is_browser().then(|| view.to_string())
}
