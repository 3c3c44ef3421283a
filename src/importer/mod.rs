// ==========================================
// 文件导入管道 - 导入层
// ==========================================
// 职责: 上传文件解析 + 暂存加载
// ==========================================

pub mod error;
pub mod file_parser;
pub mod staging_loader;

pub use error::{ImportError, ImportResult};
pub use file_parser::{CsvParser, FileParser, SpreadsheetParser, UniversalFileParser};
pub use staging_loader::{detail_labels, StagingLoader};
