// ==========================================
// 文件导入管道 - 编排/调度错误类型
// ==========================================
// 说明: 阶段内错误已在阶段边界转为结果信封，
//       这里只剩下无法开始一次导入的错误（配置缺失、作业无法创建、队列不可用）
// ==========================================

use crate::config::error::ConfigError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("导入任务异常退出: {0}")]
    Panicked(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result 类型别名
pub type PipelineResult<T> = Result<T, PipelineError>;

/// 从 catch_unwind 的载荷中取出 panic 消息
pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
