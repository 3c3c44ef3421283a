// ==========================================
// 文件导入管道 - 动态 SQL 辅助
// ==========================================
// 职责: 标识符转义、JSON 值 <-> SQLite 值转换、时间戳格式
// 说明: 暂存表结构由宿主决定，只能在运行期拼接表名/列名
// ==========================================

use crate::domain::types::StagedRow;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::Row;

/// 转义 SQL 标识符（双引号包裹，内部双引号加倍）
pub fn quote_ident(name: &str) -> RepositoryResult<String> {
    if name.trim().is_empty() || name.contains('\0') {
        return Err(RepositoryError::InvalidIdentifier(name.to_string()));
    }
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// JSON 值 -> SQLite 值
pub fn to_sql_value(value: &serde_json::Value) -> SqlValue {
    match value {
        serde_json::Value::Null => SqlValue::Null,
        serde_json::Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                SqlValue::Integer(i)
            } else if let Some(f) = n.as_f64() {
                SqlValue::Real(f)
            } else {
                SqlValue::Text(n.to_string())
            }
        }
        serde_json::Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

/// SQLite 值 -> JSON 值
pub fn from_sql_value(value: ValueRef<'_>) -> serde_json::Value {
    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => serde_json::Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        ValueRef::Text(t) | ValueRef::Blob(t) => {
            serde_json::Value::String(String::from_utf8_lossy(t).to_string())
        }
    }
}

/// 按列名把一行结果映射为 StagedRow
pub fn row_to_staged(row: &Row<'_>, columns: &[String]) -> rusqlite::Result<StagedRow> {
    let mut staged = StagedRow::new();
    for (idx, name) in columns.iter().enumerate() {
        staged.insert(name.clone(), from_sql_value(row.get_ref(idx)?));
    }
    Ok(staged)
}

/// 定长 UTC 时间戳（微秒精度），保证字符串比较与时间先后一致
pub fn timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn now_timestamp() -> String {
    timestamp(Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("staging_orders").unwrap(), "\"staging_orders\"");
        assert_eq!(quote_ident("we\"ird").unwrap(), "\"we\"\"ird\"");
        assert!(quote_ident("  ").is_err());
    }

    #[test]
    fn test_value_conversion() {
        assert_eq!(to_sql_value(&json!(null)), SqlValue::Null);
        assert_eq!(to_sql_value(&json!(true)), SqlValue::Integer(1));
        assert_eq!(to_sql_value(&json!(12)), SqlValue::Integer(12));
        assert_eq!(to_sql_value(&json!(1.5)), SqlValue::Real(1.5));
        assert_eq!(to_sql_value(&json!("x")), SqlValue::Text("x".to_string()));

        assert_eq!(from_sql_value(ValueRef::Integer(4)), json!(4));
        assert_eq!(from_sql_value(ValueRef::Text(b"abc")), json!("abc"));
        assert_eq!(from_sql_value(ValueRef::Null), json!(null));
    }

    #[test]
    fn test_timestamp_is_fixed_width() {
        let a = timestamp(DateTime::from_timestamp(0, 0).unwrap());
        let b = timestamp(DateTime::from_timestamp(0, 500_000_000).unwrap());
        assert_eq!(a.len(), b.len());
        assert!(a < b);
    }
}
