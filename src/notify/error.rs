// ==========================================
// 文件导入管道 - 通知模块错误类型
// ==========================================
// 工具: thiserror 派生宏
// ==========================================

use thiserror::Error;

/// 通知模块错误类型
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("通知发送失败: {0}")]
    Delivery(String),

    #[error("通知模板错误: {0}")]
    Template(String),

    #[error("校验报表生成失败: {0}")]
    Report(String),

    #[error("文件读写失败: {0}")]
    Io(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<std::io::Error> for NotifyError {
    fn from(err: std::io::Error) -> Self {
        NotifyError::Io(err.to_string())
    }
}

impl From<csv::Error> for NotifyError {
    fn from(err: csv::Error) -> Self {
        NotifyError::Report(err.to_string())
    }
}

impl From<serde_json::Error> for NotifyError {
    fn from(err: serde_json::Error) -> Self {
        NotifyError::Template(err.to_string())
    }
}

/// Result 类型别名
pub type NotifyResult<T> = Result<T, NotifyError>;
