// ==========================================
// 文件导入管道 - 校验结果模型
// ==========================================
// 职责: 单条比对规则的结果、规范化回写值、汇总结构
// ==========================================

use crate::domain::types::StagedRow;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 规范化回写值: 校验通过的日期/数值改写为规范格式
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Normalization {
    pub id: i64,
    pub column: String,
    pub value: serde_json::Value,
}

// ==========================================
// 比对失败 (Comparison Failure)
// ==========================================
// row_count > 0 即视为该规则未通过
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComparisonFailure {
    pub comparison: String,
    pub row_count: usize,
    /// 问题记录（保留暂存表 id，便于回显给用户）
    pub records: Vec<StagedRow>,
    /// 规则无法执行时的说明
    pub message: Option<String>,
    /// 已回写到暂存表的规范化值
    pub normalized: Vec<Normalization>,
}

impl ComparisonFailure {
    pub fn from_records(comparison: &str, records: Vec<StagedRow>) -> Self {
        Self {
            comparison: comparison.to_string(),
            row_count: records.len(),
            records,
            message: None,
            normalized: Vec::new(),
        }
    }

    /// 规则无法执行（未知规则、存储错误等）
    ///
    /// row_count 固定为 1，保证上传被拦截而不是被静默放行
    pub fn blocked(comparison: &str, message: String) -> Self {
        Self {
            comparison: comparison.to_string(),
            row_count: 1,
            records: Vec::new(),
            message: Some(message),
            normalized: Vec::new(),
        }
    }

    pub fn passed(&self) -> bool {
        self.row_count == 0
    }
}

/// 校验失败映射: 规则名 -> 失败结果（仅包含未通过的规则）
pub type ValidationFailures = BTreeMap<String, ComparisonFailure>;

// ==========================================
// 汇总 (Load Summary)
// ==========================================

/// 汇总阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadPhase {
    Transform,
    Load,
}

/// 单个类别的记录包
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordBundle {
    pub count: usize,
    pub records: Vec<serde_json::Value>,
}

impl RecordBundle {
    pub fn new(records: Vec<serde_json::Value>) -> Self {
        Self {
            count: records.len(),
            records,
        }
    }
}

/// 汇总结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadSummary {
    pub message: String,
    pub success: bool,
    /// 四个类别全部为空（空文件），区别于成功与校验失败
    pub empty: bool,
    /// transform 阶段为 transformed_data，load 阶段为 new_data
    pub successful: BTreeMap<String, RecordBundle>,
    pub failed: RecordBundle,
}
