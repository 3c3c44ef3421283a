// ==========================================
// 文件导入管道 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口，屏蔽数据库细节
// 约束: 值一律参数化；表名/列名只能经 quote_ident 拼接
// ==========================================

pub mod error;
pub mod import_queue_repo;
pub mod job_log_repo;
pub mod sql_value;
pub mod staging_repo;

// 重导出核心仓储
pub use error::{RepositoryError, RepositoryResult};
pub use import_queue_repo::ImportQueueRepository;
pub use job_log_repo::JobLogRepository;
pub use staging_repo::{SqliteStagingRepository, StagingRepository};
