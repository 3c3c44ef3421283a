// ==========================================
// 文件导入管道 - 通知模板注册表
// ==========================================
// 职责: 以类型化的模板标识查找通知主题、正文与订阅人
// 来源: 启动时从 JSON 加载一次，之后只读
// ==========================================

use crate::notify::error::{NotifyError, NotifyResult};
use crate::notify::notifier::Recipient;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// 重新上传页面的路径前缀
pub const REPROCESS_PATH_PREFIX: &str = "file-transfer";

// ==========================================
// 模板标识 (Template Id)
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TemplateId {
    /// 暂存失败
    StagingError,
    /// 落库失败: 文件无数据
    NoData,
    /// 落库失败: 未处理
    Unprocessed,
    /// 未提供上传文件
    MissingFile,
    /// 数据集专属模板（校验失败 / 成功 / 升级）
    Dataset(String),
}

impl TemplateId {
    pub fn as_str(&self) -> &str {
        match self {
            TemplateId::StagingError => "staging_error",
            TemplateId::NoData => "no_data",
            TemplateId::Unprocessed => "unprocessed",
            TemplateId::MissingFile => "missing_file",
            TemplateId::Dataset(name) => name.as_str(),
        }
    }

    pub fn dataset(name: &str) -> Self {
        TemplateId::from(name.to_string())
    }
}

impl From<String> for TemplateId {
    fn from(s: String) -> Self {
        match s.as_str() {
            "staging_error" => TemplateId::StagingError,
            "no_data" => TemplateId::NoData,
            "unprocessed" => TemplateId::Unprocessed,
            "missing_file" => TemplateId::MissingFile,
            _ => TemplateId::Dataset(s),
        }
    }
}

impl From<TemplateId> for String {
    fn from(id: TemplateId) -> Self {
        id.as_str().to_string()
    }
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 通知模板 (Notification Template)
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationTemplate {
    pub id: TemplateId,
    pub subject: String,
    #[serde(default)]
    pub body: String,
    /// 重新上传页面的 slug（校验失败邮件与"请稍候"跳转使用）
    #[serde(default)]
    pub reprocess_slug: Option<String>,
    #[serde(default)]
    pub subscribers: Vec<Recipient>,
}

impl NotificationTemplate {
    /// 相对路径形式的重新上传地址
    pub fn reprocess_path(&self) -> Option<String> {
        self.reprocess_slug
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(|slug| format!("{}/{}", REPROCESS_PATH_PREFIX, slug))
    }

    /// 选择了短信通道的订阅人
    pub fn sms_recipients(&self) -> Vec<Recipient> {
        self.subscribers
            .iter()
            .filter(|r| r.send_via_sms)
            .cloned()
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct TemplateFile {
    templates: Vec<NotificationTemplate>,
}

// ==========================================
// TemplateRegistry
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: BTreeMap<TemplateId, NotificationTemplate>,
}

impl TemplateRegistry {
    /// 同一标识出现多次时后者覆盖前者
    pub fn new(templates: Vec<NotificationTemplate>) -> Self {
        let templates = templates.into_iter().map(|t| (t.id.clone(), t)).collect();
        Self { templates }
    }

    /// 从 JSON 加载（`{"templates": [...]}`）
    pub fn from_json(raw: &str) -> NotifyResult<Self> {
        let file: TemplateFile = serde_json::from_str(raw)?;
        Ok(Self::new(file.templates))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> NotifyResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn get(&self, id: &TemplateId) -> NotifyResult<&NotificationTemplate> {
        self.templates
            .get(id)
            .ok_or_else(|| NotifyError::Template(format!("通知模板未配置: {}", id)))
    }

    /// 模板订阅人（模板缺失时为空）
    pub fn subscribers(&self, id: &TemplateId) -> Vec<Recipient> {
        self.templates
            .get(id)
            .map(|t| t.subscribers.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}
