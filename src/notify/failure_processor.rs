// ==========================================
// 文件导入管道 - 结果通知组装
// ==========================================
// 职责: 按导入终态组装邮件正文与附件，并发送邮件 + 短信
// 规则:
// - 邮件一律发给管理员，模板订阅人抄送
// - 邮件发出后，以邮件主题向选择了短信通道的订阅人群发短信
// - 发送失败只记日志，不影响导入终态
// ==========================================

use crate::config::config_manager::PipelineSettings;
use crate::config::dataset_config::DatasetConfig;
use crate::domain::comparison::ValidationFailures;
use crate::domain::queue::UploadedFile;
use crate::domain::staging::StagingResult;
use crate::i18n::{t, t_with_args};
use crate::notify::error::NotifyResult;
use crate::notify::notifier::{Attachment, NotificationMessage, Notifier, Recipient};
use crate::notify::report::write_failure_report;
use crate::notify::template::{NotificationTemplate, TemplateId, TemplateRegistry};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// 正文段落分隔
const PARAGRAPH: &str = "\n\n";

pub struct FailureProcessor {
    notifier: Arc<dyn Notifier>,
    templates: Arc<TemplateRegistry>,
    admin: Recipient,
    base_url: String,
    report_dir: PathBuf,
}

impl FailureProcessor {
    pub fn new(
        notifier: Arc<dyn Notifier>,
        templates: Arc<TemplateRegistry>,
        settings: &PipelineSettings,
    ) -> Self {
        Self {
            notifier,
            templates,
            admin: Recipient::new(settings.admin_email.clone(), settings.admin_name.clone()),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            report_dir: settings.report_dir.clone(),
        }
    }

    pub fn templates(&self) -> &TemplateRegistry {
        &self.templates
    }

    // ==========================================
    // 各终态的通知
    // ==========================================

    /// 暂存失败: 附原文件，列出问题与失败行
    pub async fn staging_failure(&self, file: &UploadedFile, result: &StagingResult) {
        let id = TemplateId::StagingError;
        let errors: Vec<String> = result
            .outcome
            .failed_rows
            .iter()
            .filter_map(|row| serde_json::to_string(row).ok())
            .collect();

        let outcome = self
            .send_with(&id, vec![original_attachment(file)], |template| {
                let mut body = vec![
                    template.body.clone(),
                    t_with_args("notify.original_attached", &[("filename", &file.filename)]),
                    t("notify.issues_heading"),
                    result.message.clone(),
                ];
                if !errors.is_empty() {
                    body.push(t("notify.errors_heading"));
                    body.push(errors.join("\n"));
                }
                body.join(PARAGRAPH)
            })
            .await;
        log_delivery(&id, outcome);
    }

    /// 校验失败: 每条未通过的规则一个 CSV 报表，再附原文件
    pub async fn validation_failures(
        &self,
        dataset: &DatasetConfig,
        file: &UploadedFile,
        failures: &ValidationFailures,
    ) {
        let id = TemplateId::dataset(dataset.failure_template_name());
        let now = Utc::now();

        let mut attachments = Vec::with_capacity(failures.len() + 1);
        for failure in failures.values() {
            match write_failure_report(&self.report_dir, &dataset.name, failure, &now) {
                Ok(attachment) => attachments.push(attachment),
                Err(e) => warn!(
                    data_set = %dataset.name,
                    comparison = %failure.comparison,
                    error = %e,
                    "校验失败报表生成失败"
                ),
            }
        }
        attachments.push(original_attachment(file));

        let outcome = self
            .send_with(&id, attachments, |template| {
                match template.reprocess_path() {
                    Some(path) => {
                        let url = format!("{}/{}", self.base_url, path);
                        format!(
                            "{} {}",
                            template.body,
                            t_with_args(
                                "notify.reprocess",
                                &[("filename", &file.filename), ("url", &url)],
                            )
                        )
                    }
                    None => template.body.clone(),
                }
            })
            .await;
        log_delivery(&id, outcome);
    }

    /// 落库成功
    pub async fn success(&self, dataset: &DatasetConfig) {
        let id = TemplateId::dataset(dataset.success_template_name());
        let outcome = self
            .send_with(&id, Vec::new(), |template| template.body.clone())
            .await;
        log_delivery(&id, outcome);
    }

    /// 落库失败
    ///
    /// # 参数
    /// - empty: true 使用"文件无数据"模板，否则使用"未处理"模板
    pub async fn load_failure(&self, file: &UploadedFile, empty: bool) {
        let id = if empty {
            TemplateId::NoData
        } else {
            TemplateId::Unprocessed
        };
        let outcome = self
            .send_with(&id, vec![original_attachment(file)], |template| {
                format!(
                    "{}{}{}",
                    template.body,
                    PARAGRAPH,
                    t_with_args("notify.original_attached", &[("filename", &file.filename)])
                )
            })
            .await;
        log_delivery(&id, outcome);
    }

    /// 未提供上传文件
    pub async fn missing_file(&self, data_set: &str) {
        let id = TemplateId::MissingFile;
        let outcome = self
            .send_with(&id, Vec::new(), |template| {
                format!(
                    "{}{}{}",
                    template.body,
                    PARAGRAPH,
                    t_with_args("notify.missing_file", &[("dataset", data_set)])
                )
            })
            .await;
        log_delivery(&id, outcome);
    }

    /// 排队多次仍无法启动的升级通知
    ///
    /// # 参数
    /// - blocking_jobs: 仍在运行的冲突作业；为空表示与冲突无关
    /// - wait: 建议等待时长
    pub async fn escalation(
        &self,
        dataset: &DatasetConfig,
        file: &UploadedFile,
        blocking_jobs: &[i64],
        wait: Duration,
    ) {
        let id = TemplateId::dataset(dataset.failure_template_name());
        let subject = t_with_args(
            "notify.escalation_subject",
            &[("readable", &dataset.readable_name)],
        );

        let details = if blocking_jobs.is_empty() {
            t("notify.escalation_other")
        } else {
            let job_ids = blocking_jobs
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(",");
            let minutes = (wait.as_secs() / 60).to_string();
            t_with_args(
                "notify.escalation_conflicts",
                &[("job_ids", &job_ids), ("minutes", &minutes)],
            )
        };
        let body = format!(
            "{}{}",
            t_with_args("notify.escalation_body", &[("filename", &file.filename)]),
            details
        );

        let cc = self.templates.subscribers(&id);
        let sms: Vec<Recipient> = cc.iter().filter(|r| r.send_via_sms).cloned().collect();
        let message = NotificationMessage {
            to: self.admin.clone(),
            cc,
            subject,
            body,
            attachments: Vec::new(),
        };

        warn!(
            data_set = %dataset.name,
            filename = %file.filename,
            blocking = ?blocking_jobs,
            "导入多次无法启动，发送升级通知"
        );
        let outcome = self.deliver(&id, &message, &sms).await;
        log_delivery(&id, outcome);
    }

    // ==========================================
    // 发送
    // ==========================================

    async fn send_with<F>(
        &self,
        id: &TemplateId,
        attachments: Vec<Attachment>,
        compose: F,
    ) -> NotifyResult<()>
    where
        F: FnOnce(&NotificationTemplate) -> String + Send,
    {
        let template = self.templates.get(id)?;
        let message = NotificationMessage {
            to: self.admin.clone(),
            cc: template.subscribers.clone(),
            subject: template.subject.clone(),
            body: compose(template),
            attachments,
        };
        let sms = template.sms_recipients();
        self.deliver(id, &message, &sms).await
    }

    async fn deliver(
        &self,
        id: &TemplateId,
        message: &NotificationMessage,
        sms: &[Recipient],
    ) -> NotifyResult<()> {
        self.notifier.notify(id, message).await?;
        if !sms.is_empty() {
            self.notifier.notify_sms(sms, &message.subject).await?;
        }
        info!(
            template = %id,
            cc = message.cc.len(),
            sms = sms.len(),
            attachments = message.attachments.len(),
            "通知已发送"
        );
        Ok(())
    }
}

fn original_attachment(file: &UploadedFile) -> Attachment {
    Attachment {
        filename: file.filename.clone(),
        path: file.path.clone(),
    }
}

fn log_delivery(id: &TemplateId, outcome: NotifyResult<()>) {
    if let Err(e) = outcome {
        warn!(template = %id, error = %e, "通知发送失败");
    }
}
