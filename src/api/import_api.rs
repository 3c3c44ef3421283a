// ==========================================
// 文件导入管道 - 导入入口 API
// ==========================================
// 职责: 宿主应用调用的唯一入口
// - 未提供文件: 发送缺失文件通知，返回 400 信封
// - 浏览器调用方: 内联执行，返回跳转 / 视图 / 信封
// - 程序调用方: 加入队列，返回 200 "已排队" 信封（content 为文件名）
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::config::dataset_config::DatasetRegistry;
use crate::domain::outcome::{ImportOutcome, ResultEnvelope};
use crate::domain::queue::UploadedFile;
use crate::domain::types::CallerOrigin;
use crate::i18n::{t, t_with_args};
use crate::notify::failure_processor::FailureProcessor;
use crate::pipeline::scheduler::{ConflictScheduler, InteractiveResponse};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// 入口响应
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ImportResponse {
    /// 结果信封（程序调用方，或没有视图的终态）
    Envelope(ResultEnvelope),
    /// 浏览器视图
    View {
        view: String,
        outcome: ImportOutcome,
    },
    /// 存在冲突导入，请稍后重试
    Redirect {
        url: String,
        job_ids: Vec<i64>,
        wait_secs: u64,
    },
}

impl ImportResponse {
    fn from_outcome(outcome: ImportOutcome) -> Self {
        match outcome.view.clone() {
            Some(view) => ImportResponse::View { view, outcome },
            None => ImportResponse::Envelope(outcome.envelope()),
        }
    }

    fn from_interactive(response: InteractiveResponse) -> Self {
        match response {
            InteractiveResponse::Redirect {
                url,
                job_ids,
                wait_secs,
            } => ImportResponse::Redirect {
                url,
                job_ids,
                wait_secs,
            },
            InteractiveResponse::Outcome(outcome) => Self::from_outcome(outcome),
        }
    }
}

/// 导入 API
pub struct ImportApi {
    datasets: Arc<DatasetRegistry>,
    scheduler: Arc<ConflictScheduler>,
    notifications: Arc<FailureProcessor>,
}

impl ImportApi {
    pub fn new(
        datasets: Arc<DatasetRegistry>,
        scheduler: Arc<ConflictScheduler>,
        notifications: Arc<FailureProcessor>,
    ) -> Self {
        Self {
            datasets,
            scheduler,
            notifications,
        }
    }

    /// 处理一次上传
    ///
    /// # 参数
    /// - data_set: 数据集名
    /// - upload: 宿主已落盘的上传文件；None 表示请求中没有文件
    /// - origin: 调用方来源
    ///
    /// # 返回
    /// - Ok(ImportResponse): 跳转 / 视图 / 信封
    /// - Err(ApiError): 数据集未配置、存储不可用等，导入未开始
    #[instrument(skip(self, upload))]
    pub async fn process_import(
        &self,
        data_set: &str,
        upload: Option<UploadedFile>,
        origin: CallerOrigin,
    ) -> ApiResult<ImportResponse> {
        let file = match self.accept_upload(data_set, upload).await? {
            Ok(file) => file,
            Err(rejected) => return Ok(ImportResponse::Envelope(rejected)),
        };

        if origin.is_browser() {
            let response = self
                .scheduler
                .run_interactive(data_set, file, origin)
                .await?;
            return Ok(ImportResponse::from_interactive(response));
        }

        let dataset = self.datasets.get(data_set)?;
        let filename = file.filename.clone();
        let task_id = self.scheduler.enqueue(data_set, file)?;
        info!(task_id = %task_id, filename = %filename, "导入已排队");

        Ok(ImportResponse::Envelope(ResultEnvelope::ok(
            t_with_args("import.queued", &[("readable", &dataset.readable_name)]),
            serde_json::Value::String(filename),
        )))
    }

    /// 程序调用方的内联导入（不排队，直接拿到信封或跳转）
    #[instrument(skip(self, upload))]
    pub async fn process_import_inline(
        &self,
        data_set: &str,
        upload: Option<UploadedFile>,
    ) -> ApiResult<ImportResponse> {
        let file = match self.accept_upload(data_set, upload).await? {
            Ok(file) => file,
            Err(rejected) => return Ok(ImportResponse::Envelope(rejected)),
        };

        let response = self
            .scheduler
            .run_interactive(data_set, file, CallerOrigin::Api)
            .await?;
        Ok(ImportResponse::from_interactive(response))
    }

    // 外层 Err: 数据集未配置；内层 Err: 需要直接返回给调用方的 400 信封
    async fn accept_upload(
        &self,
        data_set: &str,
        upload: Option<UploadedFile>,
    ) -> ApiResult<Result<UploadedFile, ResultEnvelope>> {
        let file = match upload {
            Some(file) => file,
            None => {
                warn!(data_set = %data_set, "请求未包含上传文件");
                self.notifications.missing_file(data_set).await;
                return Ok(Err(ResultEnvelope::bad_request(t("import.no_file"))));
            }
        };

        if !self.datasets.contains(data_set) {
            return Err(ApiError::UnknownDataset(data_set.to_string()));
        }

        if !file.path.is_file() {
            warn!(path = %file.path.display(), "上传文件不存在");
            return Ok(Err(ResultEnvelope::bad_request(t_with_args(
                "import.file_not_found",
                &[("path", &file.path.display().to_string())],
            ))));
        }

        Ok(Ok(file))
    }
}
