// ==========================================
// 文件导入管道 - 日期解析与格式化
// ==========================================
// 输入: 宽松解析（ISO、日期时间、RFC 3339、斜杠格式、Ymd、英文月份、电子表格序列号）
// 输出: 按 Y-m-d 风格的格式串格式化
// ==========================================

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime};

// 电子表格序列号的有效范围（1900-01-01 .. 9999-12-31）
const SERIAL_MIN: f64 = 1.0;
const SERIAL_MAX: f64 = 2_958_465.0;

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%y",
    "%m/%d/%Y",
    "%m-%d-%Y",
    "%d-%b-%Y",
    "%d %b %Y",
    "%d %B %Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%b %d %Y",
    "%B %d %Y",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%m/%d/%y %H:%M",
];

/// 宽松解析日期/日期时间
///
/// # 返回
/// - Some(NaiveDateTime): 解析成功（纯日期补 00:00:00）
/// - None: 无法解析
pub fn parse_flexible(value: &serde_json::Value) -> Option<NaiveDateTime> {
    match value {
        serde_json::Value::Number(n) => n.as_f64().and_then(from_spreadsheet_serial),
        serde_json::Value::String(s) => parse_str(s.trim()),
        _ => None,
    }
}

fn parse_str(s: &str) -> Option<NaiveDateTime> {
    if s.is_empty() {
        return None;
    }

    // Ymd（8 位数字）
    if s.len() == 8 && s.bytes().all(|b| b.is_ascii_digit()) {
        let y = s[0..4].parse().ok()?;
        let m = s[4..6].parse().ok()?;
        let d = s[6..8].parse().ok()?;
        return NaiveDate::from_ymd_opt(y, m, d).map(|date| date.and_time(NaiveTime::MIN));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }

    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }

    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Some(date.and_time(NaiveTime::MIN));
        }
    }

    None
}

/// 电子表格序列号 -> 日期时间（1900 日期系统）
pub fn from_spreadsheet_serial(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || !(SERIAL_MIN..=SERIAL_MAX).contains(&serial) {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_time(NaiveTime::MIN);
    let millis = (serial * 86_400_000.0).round() as i64;
    epoch.checked_add_signed(Duration::milliseconds(millis))
}

/// 把 Y-m-d 风格的格式串翻译为 chrono 格式串
///
/// 支持: Y y m n d j H G h g i s M F D l A a；反斜杠转义下一个字符
pub fn translate_format(format: &str) -> String {
    let mut out = String::with_capacity(format.len() * 2);
    let mut chars = format.chars();
    while let Some(c) = chars.next() {
        let spec = match c {
            'Y' => "%Y",
            'y' => "%y",
            'm' => "%m",
            'n' => "%-m",
            'd' => "%d",
            'j' => "%-d",
            'H' => "%H",
            'G' => "%-H",
            'h' => "%I",
            'g' => "%-I",
            'i' => "%M",
            's' => "%S",
            'M' => "%b",
            'F' => "%B",
            'D' => "%a",
            'l' => "%A",
            'A' => "%p",
            'a' => "%P",
            '\\' => {
                if let Some(next) = chars.next() {
                    push_literal(&mut out, next);
                }
                continue;
            }
            other => {
                push_literal(&mut out, other);
                continue;
            }
        };
        out.push_str(spec);
    }
    out
}

fn push_literal(out: &mut String, c: char) {
    if c == '%' {
        out.push_str("%%");
    } else {
        out.push(c);
    }
}

/// 按 Y-m-d 风格格式串输出
pub fn format_datetime(dt: &NaiveDateTime, format: &str) -> String {
    dt.format(&translate_format(format)).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ymd(v: serde_json::Value) -> Option<String> {
        parse_flexible(&v).map(|dt| format_datetime(&dt, "Y-m-d"))
    }

    #[test]
    fn test_parse_common_forms() {
        assert_eq!(ymd(json!("2024-01-15")), Some("2024-01-15".to_string()));
        assert_eq!(ymd(json!("2024/01/15")), Some("2024-01-15".to_string()));
        assert_eq!(ymd(json!("1/15/2024")), Some("2024-01-15".to_string()));
        assert_eq!(ymd(json!("1/15/24")), Some("2024-01-15".to_string()));
        assert_eq!(ymd(json!("20240115")), Some("2024-01-15".to_string()));
        assert_eq!(ymd(json!("15-Jan-2024")), Some("2024-01-15".to_string()));
        assert_eq!(ymd(json!("January 15, 2024")), Some("2024-01-15".to_string()));
        assert_eq!(ymd(json!("2024-01-15 13:45:00")), Some("2024-01-15".to_string()));
        assert_eq!(ymd(json!("2024-01-15T13:45:00+02:00")), Some("2024-01-15".to_string()));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(ymd(json!("not-a-date")), None);
        assert_eq!(ymd(json!("2024-13-40")), None);
        assert_eq!(ymd(json!("")), None);
        assert_eq!(ymd(json!(null)), None);
        assert_eq!(ymd(json!(true)), None);
    }

    #[test]
    fn test_spreadsheet_serial() {
        // 45306 = 2024-01-15
        assert_eq!(ymd(json!(45306)), Some("2024-01-15".to_string()));
        let dt = from_spreadsheet_serial(45306.5).unwrap();
        assert_eq!(format_datetime(&dt, "Y-m-d H:i:s"), "2024-01-15 12:00:00");
        assert!(from_spreadsheet_serial(-3.0).is_none());
    }

    #[test]
    fn test_translate_format() {
        assert_eq!(translate_format("Y-m-d"), "%Y-%m-%d");
        assert_eq!(translate_format("Y-m-d-H-i-s"), "%Y-%m-%d-%H-%M-%S");
        assert_eq!(translate_format("n/j/y"), "%-m/%-d/%y");
        assert_eq!(translate_format("\\Y 100%"), "Y 100%%");

        let dt = parse_flexible(&json!("2024-03-05 07:08:09")).unwrap();
        assert_eq!(format_datetime(&dt, "n/j/Y g:i A"), "3/5/2024 7:08 AM");
        assert_eq!(format_datetime(&dt, "D, d M Y"), "Tue, 05 Mar 2024");
    }
}
