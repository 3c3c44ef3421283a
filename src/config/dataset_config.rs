// ==========================================
// 文件导入管道 - 数据集配置表
// ==========================================
// 职责: 数据集 -> {暂存表, 规则, 冲突集, 容忍策略, 队列, 通知模板}
// 加载: 进程启动时从 JSON 一次性加载，运行期只读
// ==========================================

use crate::config::error::{ConfigError, ConfigResult};
use crate::domain::job::job_type_label;
use crate::domain::types::InsertTolerance;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// 默认队列名
pub const DEFAULT_QUEUE: &str = "file_import";

/// 默认日期格式
pub const DEFAULT_DATE_FORMAT: &str = "Y-m-d";

fn default_queue() -> String {
    DEFAULT_QUEUE.to_string()
}

fn default_date_format() -> String {
    DEFAULT_DATE_FORMAT.to_string()
}

// ==========================================
// 声明式比对规则 (Rule Definition)
// ==========================================
// JSON 形如 {"check": "valid_date", "column": "ship_date", "format": "Y-m-d"}
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum RuleDefinition {
    /// 指定列为 null 的暂存行
    MissingField { column: String },

    /// 指定列的值在参照表中不存在的暂存行
    ExistingReference {
        column: String,
        reference_table: String,
        reference_key: String,
        /// true: null 值自动通过
        #[serde(default)]
        nullable: bool,
        /// 回查失败行时的投影列（空表示全部列）
        #[serde(default)]
        projection: Vec<String>,
    },

    /// 指定列无法解析为日期的暂存行；可解析的值改写为规范格式
    ValidDate {
        column: String,
        #[serde(default = "default_date_format")]
        format: String,
        #[serde(default)]
        nullable: bool,
    },

    /// 指定列无法转换为浮点数的暂存行
    ValidNumeric { column: String },
}

impl RuleDefinition {
    pub fn column(&self) -> &str {
        match self {
            RuleDefinition::MissingField { column }
            | RuleDefinition::ExistingReference { column, .. }
            | RuleDefinition::ValidDate { column, .. }
            | RuleDefinition::ValidNumeric { column } => column,
        }
    }
}

// ==========================================
// 数据集配置 (Dataset Config)
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// 数据集名（路由、通知模板、报表文件名均使用）
    pub name: String,
    /// 人类可读名称
    pub readable_name: String,
    /// 暂存表名
    pub staging_table: String,
    /// 按顺序执行的比对规则名
    #[serde(default)]
    pub comparisons: Vec<String>,
    /// 声明式规则定义（规则名 -> 定义）
    #[serde(default)]
    pub rules: BTreeMap<String, RuleDefinition>,
    /// 冲突暂存表（不得同时运行）
    #[serde(default)]
    pub conflicting_tables: Vec<String>,
    #[serde(default)]
    pub insert_tolerance: InsertTolerance,
    #[serde(default = "default_queue")]
    pub queue: String,
    /// 校验失败通知模板名（缺省为数据集名）
    #[serde(default)]
    pub failure_template: Option<String>,
    /// 成功通知模板名（缺省为数据集名）
    #[serde(default)]
    pub success_template: Option<String>,
}

impl DatasetConfig {
    /// 本数据集的作业类型标签
    pub fn job_type(&self) -> String {
        job_type_label(&self.staging_table)
    }

    /// 冲突集: 自身标签在首位，其余按配置顺序去重
    pub fn conflict_set(&self) -> Vec<String> {
        let mut set = vec![self.job_type()];
        for table in &self.conflicting_tables {
            let label = job_type_label(table);
            if !set.contains(&label) {
                set.push(label);
            }
        }
        set
    }

    pub fn failure_template_name(&self) -> &str {
        self.failure_template.as_deref().unwrap_or(&self.name)
    }

    pub fn success_template_name(&self) -> &str {
        self.success_template.as_deref().unwrap_or(&self.name)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.name.trim().is_empty() {
            return Err(invalid("name", &self.name, "数据集名不能为空"));
        }
        if self.staging_table.trim().is_empty() {
            return Err(invalid(
                &format!("{}.staging_table", self.name),
                &self.staging_table,
                "暂存表名不能为空",
            ));
        }
        if self.queue.trim().is_empty() {
            return Err(invalid(
                &format!("{}.queue", self.name),
                &self.queue,
                "队列名不能为空",
            ));
        }
        Ok(())
    }
}

fn invalid(key: &str, value: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        message: message.to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct DatasetFile {
    datasets: Vec<DatasetConfig>,
}

// ==========================================
// DatasetRegistry - 数据集配置表
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct DatasetRegistry {
    datasets: BTreeMap<String, DatasetConfig>,
}

impl DatasetRegistry {
    /// 由配置列表构造（校验名称唯一、必填项非空）
    pub fn new(datasets: Vec<DatasetConfig>) -> ConfigResult<Self> {
        let mut map = BTreeMap::new();
        for ds in datasets {
            ds.validate()?;
            if map.contains_key(&ds.name) {
                return Err(ConfigError::DuplicateDataset(ds.name));
            }
            map.insert(ds.name.clone(), ds);
        }
        Ok(Self { datasets: map })
    }

    /// 从 JSON 文本加载
    ///
    /// # 格式
    /// `{"datasets": [ {...}, ... ]}`
    pub fn from_json(raw: &str) -> ConfigResult<Self> {
        let file: DatasetFile = serde_json::from_str(raw)?;
        Self::new(file.datasets)
    }

    /// 从 JSON 文件加载
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn get(&self, name: &str) -> ConfigResult<&DatasetConfig> {
        self.datasets
            .get(name)
            .ok_or_else(|| ConfigError::DatasetNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.datasets.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.datasets.keys().map(|k| k.as_str())
    }

    /// 数据集对应的队列名（未配置的数据集落到默认队列）
    pub fn queue_for(&self, name: &str) -> String {
        self.datasets
            .get(name)
            .map(|d| d.queue.clone())
            .unwrap_or_else(default_queue)
    }
}
