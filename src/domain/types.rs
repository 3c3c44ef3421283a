// ==========================================
// 文件导入管道 - 领域基础类型
// ==========================================
// 职责: 暂存行、插入容忍策略、调用方来源、状态码
// ==========================================

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// 暂存行: 列名 -> 原始值
///
/// 列集合不保证与目标表一致，由暂存加载器负责对齐
pub type StagedRow = BTreeMap<String, serde_json::Value>;

/// HTTP 风格状态码
pub const STATUS_OK: u16 = 200;
pub const STATUS_BAD_REQUEST: u16 = 400;
pub const STATUS_SERVER_ERROR: u16 = 500;

// ==========================================
// 插入容忍策略 (Insert Tolerance)
// ==========================================
// 按表配置，不是按行的运行期决策
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsertTolerance {
    /// 插入失败计为错误，整体结果失败
    #[default]
    Strict,
    /// 插入失败的行计为跳过，不影响整体结果
    SkipFailedRows,
}

impl InsertTolerance {
    pub fn skips_failures(&self) -> bool {
        matches!(self, InsertTolerance::SkipFailedRows)
    }
}

// ==========================================
// 调用方来源 (Caller Origin)
// ==========================================
// 浏览器调用方拿到视图标识或重定向，程序调用方拿到结果信封
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallerOrigin {
    Browser,
    Api,
}

impl CallerOrigin {
    pub fn is_browser(&self) -> bool {
        matches!(self, CallerOrigin::Browser)
    }
}

impl fmt::Display for CallerOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallerOrigin::Browser => write!(f, "browser"),
            CallerOrigin::Api => write!(f, "api"),
        }
    }
}

/// 读取暂存行中的 id 列（暂存表的自增主键）
pub fn row_id(row: &StagedRow) -> Option<i64> {
    row.get("id").and_then(|v| v.as_i64())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_insert_tolerance_serde() {
        let t: InsertTolerance = serde_json::from_str("\"skip_failed_rows\"").unwrap();
        assert_eq!(t, InsertTolerance::SkipFailedRows);
        assert!(t.skips_failures());
        assert!(!InsertTolerance::default().skips_failures());
    }

    #[test]
    fn test_row_id() {
        let mut row = StagedRow::new();
        assert_eq!(row_id(&row), None);
        row.insert("id".to_string(), json!(7));
        assert_eq!(row_id(&row), Some(7));
    }
}
