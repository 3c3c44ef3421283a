// ==========================================
// 文件导入管道 - 入口层
// ==========================================
// 职责: 供宿主应用调用的导入入口，错误统一转换为 ApiError
// ==========================================

pub mod error;
pub mod import_api;

pub use error::{ApiError, ApiResult};
pub use import_api::{ImportApi, ImportResponse};
