// ==========================================
// 文件导入管道 - 通知发送接口
// ==========================================
// 职责: 邮件与短信两条通道的发送边界
// 说明: 实际投递由宿主实现；LogNotifier 只写日志，供开发与未接入投递时使用
// ==========================================

use crate::notify::error::NotifyResult;
use crate::notify::template::TemplateId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

/// 收件人
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub send_via_sms: bool,
}

impl Recipient {
    pub fn new(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: name.into(),
            phone: None,
            send_via_sms: false,
        }
    }
}

/// 邮件附件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// 收件人看到的文件名
    pub filename: String,
    pub path: PathBuf,
}

/// 一封待发送的通知邮件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationMessage {
    pub to: Recipient,
    pub cc: Vec<Recipient>,
    pub subject: String,
    pub body: String,
    pub attachments: Vec<Attachment>,
}

// ==========================================
// Notifier Trait
// ==========================================
#[async_trait]
pub trait Notifier: Send + Sync {
    /// 发送邮件通知
    async fn notify(&self, template: &TemplateId, message: &NotificationMessage)
        -> NotifyResult<()>;

    /// 批量发送短信
    async fn notify_sms(&self, recipients: &[Recipient], text: &str) -> NotifyResult<()>;
}

// ==========================================
// LogNotifier - 只写日志的实现
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(
        &self,
        template: &TemplateId,
        message: &NotificationMessage,
    ) -> NotifyResult<()> {
        info!(
            template = %template,
            to = %message.to.email,
            cc = message.cc.len(),
            attachments = message.attachments.len(),
            subject = %message.subject,
            "通知邮件"
        );
        Ok(())
    }

    async fn notify_sms(&self, recipients: &[Recipient], text: &str) -> NotifyResult<()> {
        if recipients.is_empty() {
            return Ok(());
        }
        info!(recipients = recipients.len(), text = %text, "通知短信");
        Ok(())
    }
}
