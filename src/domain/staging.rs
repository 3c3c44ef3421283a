// ==========================================
// 文件导入管道 - 暂存结果模型
// ==========================================
// 职责: 表结构对齐结果、插入结果、暂存状态
// ==========================================

use crate::domain::types::{
    StagedRow, STATUS_BAD_REQUEST, STATUS_OK, STATUS_SERVER_ERROR,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ==========================================
// 表结构对齐结果 (Schema Reconciliation)
// ==========================================
// 上传数据中存在但目标表不存在的列，逐行丢弃，不补造不填默认值
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaReconciliation {
    pub dropped_columns: BTreeSet<String>,
}

impl SchemaReconciliation {
    /// 计算需要丢弃的列
    ///
    /// # 参数
    /// - first_row: 上传数据的第 0 行（表头基准）
    /// - target_columns: 目标表列名（不含自增 id）
    pub fn reconcile<'a, I>(first_row: &StagedRow, target_columns: I) -> Self
    where
        I: IntoIterator<Item = &'a String>,
    {
        let target: BTreeSet<&str> = target_columns.into_iter().map(|c| c.as_str()).collect();
        let dropped_columns = first_row
            .keys()
            .filter(|k| is_blank_key(k) || !target.contains(k.as_str()))
            .cloned()
            .collect();
        Self { dropped_columns }
    }

    /// 按对齐结果裁剪一行
    pub fn apply(&self, row: &StagedRow) -> StagedRow {
        row.iter()
            .filter(|(k, _)| !self.dropped_columns.contains(*k) && !is_blank_key(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

// 表头异常时解析器会产生空键或 "0" 键
fn is_blank_key(key: &str) -> bool {
    let trimmed = key.trim();
    trimmed.is_empty() || trimmed == "0"
}

/// 插入失败的行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedRow {
    /// 在上传数据中的下标（从 0 开始）
    pub row_index: usize,
    pub row: StagedRow,
    pub error: String,
}

// ==========================================
// 插入结果 (Insert Outcome)
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InsertOutcome {
    pub record_count: usize,
    pub inserted: usize,
    pub errored: usize,
    pub skipped: usize,
    pub failed_rows: Vec<FailedRow>,
    pub dropped_columns: Vec<String>,
}

// ==========================================
// 暂存状态 (Staging Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StagingStatus {
    /// 全部写入（200）
    Success,
    /// 存在行级写入错误（400）
    Failed,
    /// 源文件无法解析或暂存超时（500）
    Fatal,
}

impl StagingStatus {
    pub fn code(&self) -> u16 {
        match self {
            StagingStatus::Success => STATUS_OK,
            StagingStatus::Failed => STATUS_BAD_REQUEST,
            StagingStatus::Fatal => STATUS_SERVER_ERROR,
        }
    }
}

/// 暂存加载结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagingResult {
    pub status: StagingStatus,
    pub message: String,
    pub outcome: InsertOutcome,
}

impl StagingResult {
    pub fn is_success(&self) -> bool {
        self.status == StagingStatus::Success
    }

    /// 致命失败（未进行任何暂存）
    pub fn fatal(message: String) -> Self {
        Self {
            status: StagingStatus::Fatal,
            message,
            outcome: InsertOutcome::default(),
        }
    }

    /// 失败行列表，作为结果信封的 content
    pub fn content(&self) -> serde_json::Value {
        serde_json::to_value(&self.outcome.failed_rows).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(pairs: &[(&str, serde_json::Value)]) -> StagedRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_reconcile_drops_unknown_and_blank_columns() {
        let first = row(&[
            ("order_no", json!("A1")),
            ("qty", json!(3)),
            ("comment", json!("x")),
            ("", json!("junk")),
            ("0", json!("junk")),
        ]);
        let target = vec!["order_no".to_string(), "qty".to_string()];

        let rec = SchemaReconciliation::reconcile(&first, &target);
        assert_eq!(
            rec.dropped_columns.iter().cloned().collect::<Vec<_>>(),
            vec!["".to_string(), "0".to_string(), "comment".to_string()]
        );

        let applied = rec.apply(&first);
        assert_eq!(applied.len(), 2);
        assert!(applied.contains_key("order_no"));
        assert!(!applied.contains_key("comment"));
    }

    #[test]
    fn test_staging_status_codes() {
        assert_eq!(StagingStatus::Success.code(), 200);
        assert_eq!(StagingStatus::Failed.code(), 400);
        assert_eq!(StagingStatus::Fatal.code(), 500);
        assert!(!StagingResult::fatal("boom".to_string()).is_success());
    }
}
