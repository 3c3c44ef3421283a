// ==========================================
// 文件导入管道 - 应用层
// ==========================================
// 职责: 组装各层实例，供宿主应用或 worker 进程持有
// ==========================================

pub mod state;

// 重导出
pub use state::{PipelineParts, PipelineState};
