// ==========================================
// 文件导入管道 - 通知层
// ==========================================
// 职责: 通知模板、发送接口、校验失败报表、各终态的通知组装
// ==========================================

pub mod error;
pub mod failure_processor;
pub mod notifier;
pub mod report;
pub mod template;

pub use error::{NotifyError, NotifyResult};
pub use failure_processor::FailureProcessor;
pub use notifier::{Attachment, LogNotifier, NotificationMessage, Notifier, Recipient};
pub use report::{report_filename, write_failure_report};
pub use template::{NotificationTemplate, TemplateId, TemplateRegistry};
