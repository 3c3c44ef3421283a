// ==========================================
// 文件导入管道 - 入口层错误类型
// ==========================================
// 职责: 把各层的技术错误转换为调用方可理解的错误，并映射到结果信封
// ==========================================

use crate::config::error::ConfigError;
use crate::domain::outcome::ResultEnvelope;
use crate::domain::types::{STATUS_BAD_REQUEST, STATUS_SERVER_ERROR};
use crate::importer::error::ImportError;
use crate::pipeline::error::PipelineError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// 入口层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 调用方错误
    // ==========================================
    #[error("数据集未配置: {0}")]
    UnknownDataset(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("无效的状态转换: from={from} to={to}")]
    InvalidStateTransition { from: String, to: String },

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    #[error("数据库事务失败: {0}")]
    DatabaseTransactionError(String),

    // ==========================================
    // 导入与配置错误
    // ==========================================
    #[error("文件导入失败: {0}")]
    ImportError(String),

    #[error("配置错误: {0}")]
    ConfigError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ApiError {
    /// HTTP 风格状态码
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::UnknownDataset(_)
            | ApiError::NotFound(_)
            | ApiError::InvalidStateTransition { .. }
            | ApiError::ImportError(_) => STATUS_BAD_REQUEST,
            _ => STATUS_SERVER_ERROR,
        }
    }

    /// 转换为失败的结果信封
    pub fn to_envelope(&self) -> ResultEnvelope {
        ResultEnvelope::fail(self.to_string(), serde_json::Value::Null, self.status_code())
    }
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::TableNotFound(table) => {
                ApiError::ConfigError(format!("暂存表不存在: {}", table))
            }
            RepositoryError::ColumnNotFound { table, column } => {
                ApiError::ConfigError(format!("列不存在: {}.{}", table, column))
            }
            RepositoryError::InvalidIdentifier(name) => {
                ApiError::ConfigError(format!("非法标识符: {}", name))
            }
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseTransactionError(msg) => {
                ApiError::DatabaseTransactionError(msg)
            }
            RepositoryError::DatabaseQueryError(msg)
            | RepositoryError::UniqueConstraintViolation(msg) => ApiError::DatabaseError(msg),
            RepositoryError::InvalidStateTransition { from, to } => {
                ApiError::InvalidStateTransition { from, to }
            }
            RepositoryError::Serialization(msg) => ApiError::InternalError(msg),
            RepositoryError::Other(err) => ApiError::Other(err),
        }
    }
}

// ==========================================
// 从 ConfigError 转换
// ==========================================
impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::DatasetNotFound(name) => ApiError::UnknownDataset(name),
            ConfigError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", msg))
            }
            ConfigError::Database(msg) => ApiError::DatabaseError(msg),
            other => ApiError::ConfigError(other.to_string()),
        }
    }
}

// ==========================================
// 从 ImportError 转换
// ==========================================
impl From<ImportError> for ApiError {
    fn from(err: ImportError) -> Self {
        match err {
            ImportError::Repository(e) => e.into(),
            ImportError::InternalError(msg) => ApiError::InternalError(msg),
            ImportError::Other(e) => ApiError::Other(e),
            other => ApiError::ImportError(other.to_string()),
        }
    }
}

// ==========================================
// 从 PipelineError 转换
// ==========================================
impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Config(e) => e.into(),
            PipelineError::Repository(e) => e.into(),
            PipelineError::Panicked(msg) => ApiError::InternalError(msg),
            PipelineError::Other(e) => ApiError::Other(e),
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_error_conversion() {
        let repo_err = RepositoryError::NotFound {
            entity: "ImportJob".to_string(),
            id: "42".to_string(),
        };
        let api_err: ApiError = repo_err.into();
        match api_err {
            ApiError::NotFound(msg) => {
                assert!(msg.contains("ImportJob"));
                assert!(msg.contains("42"));
            }
            _ => panic!("Expected NotFound"),
        }
    }

    #[test]
    fn test_unknown_dataset_is_bad_request() {
        let err: ApiError = PipelineError::Config(ConfigError::DatasetNotFound("lots".into())).into();
        assert!(matches!(err, ApiError::UnknownDataset(ref name) if name == "lots"));

        let envelope = err.to_envelope();
        assert!(!envelope.success);
        assert_eq!(envelope.status, STATUS_BAD_REQUEST);
    }

    #[test]
    fn test_import_error_unwraps_repository() {
        let err: ApiError = ImportError::Repository(RepositoryError::LockError("poisoned".into())).into();
        assert!(matches!(err, ApiError::DatabaseConnectionError(_)));
        assert_eq!(err.status_code(), STATUS_SERVER_ERROR);
    }
}
