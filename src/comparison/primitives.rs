// ==========================================
// 文件导入管道 - 比对原语（纯函数）
// ==========================================
// 职责: 日期校验、数值转换、必填字段消息、组合键
// 红线: 不访问存储，可在任意规则中复用
// ==========================================

use crate::comparison::date_format::{format_datetime, parse_flexible};
use crate::i18n::t_with_args;

/// 校验并规范化日期
///
/// # 参数
/// - value: 原始值（字符串或电子表格序列号）
/// - format: 目标格式（如 "Y-m-d"）
///
/// # 返回
/// - Some(String): 规范化后的日期
/// - None: 无法解析（null 也返回 None）
pub fn valid_date(value: &serde_json::Value, format: &str) -> Option<String> {
    parse_flexible(value).map(|dt| format_datetime(&dt, format))
}

/// 转换为浮点数
///
/// 0 是合法数值；null、布尔、无法解析的字符串、非有限值返回 None
pub fn coerce_float(value: &serde_json::Value) -> Option<f64> {
    let f = match value {
        serde_json::Value::Number(n) => n.as_f64()?,
        serde_json::Value::String(s) => {
            let cleaned: String = s.trim().chars().filter(|c| *c != ',').collect();
            if cleaned.is_empty() {
                return None;
            }
            cleaned.parse::<f64>().ok()?
        }
        _ => return None,
    };
    f.is_finite().then_some(f)
}

/// 必填字段检查
///
/// # 返回
/// - None: 全部字段有值
/// - Some(String): 以逗号连接的缺失字段消息
pub fn required_fields_message(fields: &[(&str, &serde_json::Value)]) -> Option<String> {
    let missing: Vec<String> = fields
        .iter()
        .filter(|(_, value)| value.is_null())
        .map(|(name, _)| t_with_args("comparison.field_required", &[("field", name)]))
        .collect();

    if missing.is_empty() {
        None
    } else {
        Some(missing.join(", "))
    }
}

/// 组合查找键: 基础编码 + 年份后两位
///
/// 任一输入缺失（或为空串）时返回 None
pub fn composite_key(base: Option<&str>, year: Option<&str>) -> Option<String> {
    let base = base.map(str::trim).filter(|s| !s.is_empty())?;
    let year = year.map(str::trim).filter(|s| !s.is_empty())?;

    let chars: Vec<char> = year.chars().collect();
    let start = chars.len().saturating_sub(2);
    let suffix: String = chars[start..].iter().collect();
    Some(format!("{}{}", base, suffix))
}

/// JSON 值的展示文本（字符串不带引号）
pub fn display_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}
