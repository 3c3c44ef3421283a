// ==========================================
// 文件导入管道 - 配置层
// ==========================================
// 职责: 数据集配置表（静态 JSON）+ 管道运行参数（config_kv）
// ==========================================

pub mod config_manager;
pub mod dataset_config;
pub mod error;

pub use config_manager::{config_keys, ConfigManager, PipelineSettings};
pub use dataset_config::{
    DatasetConfig, DatasetRegistry, RuleDefinition, DEFAULT_DATE_FORMAT, DEFAULT_QUEUE,
};
pub use error::{ConfigError, ConfigResult};
