// ==========================================
// 文件导入管道 - 编排与调度层
// ==========================================
// 职责: 作业跟踪接口、落库能力接口、导入编排器、冲突感知调度器、队列 worker
// ==========================================

pub mod error;
pub mod loader;
pub mod orchestrator;
pub mod scheduler;
pub mod tracker;
pub mod worker;

pub use error::{PipelineError, PipelineResult};
pub use loader::{DatasetLoader, LoaderRegistry};
pub use orchestrator::{ImportOrchestrator, ImportRequest};
pub use scheduler::{Admission, AttemptAction, AttemptResult, ConflictScheduler, InteractiveResponse};
pub use tracker::JobTracker;
pub use worker::ImportWorker;
