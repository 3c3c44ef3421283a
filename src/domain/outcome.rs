// ==========================================
// 文件导入管道 - 终态结果与结果信封
// ==========================================
// 职责: ImportOutcome / ResultEnvelope / TableStatus
// ==========================================

use crate::domain::comparison::LoadSummary;
use crate::domain::types::{STATUS_BAD_REQUEST, STATUS_OK};
use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 终态类型 (Outcome Kind)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    StagingFailed,
    ValidationFailed,
    LoadSucceeded,
    LoadFailedEmpty,
    LoadFailedOther,
}

impl OutcomeKind {
    pub fn is_success(&self) -> bool {
        matches!(self, OutcomeKind::LoadSucceeded)
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OutcomeKind::StagingFailed => "staging_failed",
            OutcomeKind::ValidationFailed => "validation_failed",
            OutcomeKind::LoadSucceeded => "load_succeeded",
            OutcomeKind::LoadFailedEmpty => "load_failed_empty",
            OutcomeKind::LoadFailedOther => "load_failed_other",
        };
        write!(f, "{}", s)
    }
}

/// 浏览器调用方的视图标识
pub mod views {
    pub const COMPARISON_FAIL: &str = "FileImport/reprocessImportFileComparisonFail";
    pub const SUCCESS: &str = "FileImport/reprocessImportFileSuccess";
    pub const LOAD_FAIL: &str = "FileImport/reprocessImportFileLoadFail";
}

// ==========================================
// 结果信封 (Result Envelope)
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEnvelope {
    pub message: String,
    pub success: bool,
    pub content: serde_json::Value,
    pub status: u16,
}

impl ResultEnvelope {
    pub fn ok(message: String, content: serde_json::Value) -> Self {
        Self {
            message,
            success: true,
            content,
            status: STATUS_OK,
        }
    }

    pub fn fail(message: String, content: serde_json::Value, status: u16) -> Self {
        Self {
            message,
            success: false,
            content,
            status,
        }
    }

    pub fn bad_request(message: String) -> Self {
        Self::fail(message, serde_json::Value::Null, STATUS_BAD_REQUEST)
    }
}

// ==========================================
// 导入终态 (Import Outcome)
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportOutcome {
    pub kind: OutcomeKind,
    pub message: String,
    pub content: serde_json::Value,
    pub status: u16,
    /// 浏览器调用方使用的视图标识（暂存失败没有视图）
    pub view: Option<String>,
    pub job_id: Option<i64>,
}

impl ImportOutcome {
    pub fn is_success(&self) -> bool {
        self.kind.is_success()
    }

    pub fn envelope(&self) -> ResultEnvelope {
        ResultEnvelope {
            message: self.message.clone(),
            success: self.is_success(),
            content: self.content.clone(),
            status: self.status,
        }
    }
}

// ==========================================
// 落库回调返回的单表状态 (Table Status)
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableStatus {
    pub table: Option<String>,
    pub success: bool,
    pub empty: bool,
    pub message: Option<String>,
    #[serde(default)]
    pub content: serde_json::Value,
}

impl TableStatus {
    pub fn succeeded(table: &str) -> Self {
        Self {
            table: Some(table.to_string()),
            success: true,
            empty: false,
            message: None,
            content: serde_json::Value::Null,
        }
    }

    pub fn empty(table: &str) -> Self {
        Self {
            table: Some(table.to_string()),
            success: false,
            empty: true,
            message: None,
            content: serde_json::Value::Null,
        }
    }

    pub fn unprocessed(table: &str, message: &str) -> Self {
        Self {
            table: Some(table.to_string()),
            success: false,
            empty: false,
            message: Some(message.to_string()),
            content: serde_json::Value::Null,
        }
    }

    /// 由汇总结果构造
    pub fn from_summary(table: &str, summary: &LoadSummary) -> Self {
        Self {
            table: Some(table.to_string()),
            success: summary.success,
            empty: summary.empty,
            message: Some(summary.message.clone()),
            content: serde_json::to_value(summary).unwrap_or(serde_json::Value::Null),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_outcome_envelope() {
        let outcome = ImportOutcome {
            kind: OutcomeKind::LoadSucceeded,
            message: "done".to_string(),
            content: json!({"n": 1}),
            status: 200,
            view: Some(views::SUCCESS.to_string()),
            job_id: Some(3),
        };
        let env = outcome.envelope();
        assert!(env.success);
        assert_eq!(env.status, 200);
        assert_eq!(env.content, json!({"n": 1}));
    }

    #[test]
    fn test_table_status_deserialize_without_content() {
        let s: TableStatus =
            serde_json::from_str(r#"{"table":null,"success":false,"empty":true,"message":null}"#)
                .unwrap();
        assert!(s.empty);
        assert_eq!(s.content, serde_json::Value::Null);
    }
}
