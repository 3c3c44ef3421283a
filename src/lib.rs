// ==========================================
// 文件导入管道 - 核心库
// ==========================================
// 流程: 上传文件 -> 暂存 -> 比对校验 -> 落库
// 调度: 同一数据集（及其冲突集）不并发，冲突时延迟重试并在超限后升级通知
// 技术栈: Rust + SQLite + tokio
// ==========================================

// 初始化国际化系统
rust_i18n::i18n!("locales", fallback = "en");

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 作业、暂存、校验、终态
pub mod domain;

// 配置层 - 数据集配置表与运行参数
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA/管道表）
pub mod db;

// 数据仓储层 - 暂存表、作业日志、导入队列
pub mod repository;

// 导入层 - 文件解析与暂存加载
pub mod importer;

// 比对规则引擎
pub mod comparison;

// 通知层
pub mod notify;

// 编排与调度层
pub mod pipeline;

// 入口层
pub mod api;

// 应用层 - 组装
pub mod app;

// 日志系统
pub mod logging;

// 国际化
pub mod i18n;

// ==========================================
// 重导出核心类型
// ==========================================

pub use api::{ApiError, ApiResult, ImportApi, ImportResponse};
pub use app::{PipelineParts, PipelineState};
pub use comparison::{ComparisonEngine, CustomComparison};
pub use config::{DatasetConfig, DatasetRegistry, PipelineSettings};
pub use domain::{
    CallerOrigin, ImportOutcome, InsertTolerance, OutcomeKind, ResultEnvelope, TableStatus,
    UploadedFile,
};
pub use notify::{LogNotifier, Notifier, TemplateId, TemplateRegistry};
pub use pipeline::{
    ConflictScheduler, DatasetLoader, ImportOrchestrator, ImportWorker, JobTracker,
};

// ==========================================
// 常量定义
// ==========================================

// 库版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
