// ==========================================
// 文件导入管道 - 领域模型层
// ==========================================
// 职责: 定义作业、暂存、校验、终态等领域类型
// 红线: 不含数据访问逻辑，不含流程编排逻辑
// ==========================================

pub mod comparison;
pub mod job;
pub mod outcome;
pub mod queue;
pub mod staging;
pub mod types;

// 重导出核心类型
pub use comparison::{
    ComparisonFailure, LoadPhase, LoadSummary, Normalization, RecordBundle, ValidationFailures,
};
pub use job::{job_type_label, ImportJob, JobDetail, JobState};
pub use outcome::{ImportOutcome, OutcomeKind, ResultEnvelope, TableStatus};
pub use queue::{QueueStatus, QueuedImport, UploadedFile};
pub use staging::{
    FailedRow, InsertOutcome, SchemaReconciliation, StagingResult, StagingStatus,
};
pub use types::{CallerOrigin, InsertTolerance, StagedRow};
