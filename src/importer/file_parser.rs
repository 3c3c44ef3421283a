// ==========================================
// 文件导入管道 - 文件解析器实现
// ==========================================
// 输出: 有序的 StagedRow 序列（首行为表头）
// 支持: CSV (.csv) / 电子表格 (.xlsx/.xlsm/.xlsb/.xls/.ods，仅第一个工作表)
// ==========================================

use crate::domain::types::StagedRow;
use crate::importer::error::{ImportError, ImportResult};
use calamine::{open_workbook_auto, Data, Reader};
use csv::ReaderBuilder;
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;
use tracing::warn;

// ==========================================
// FileParser Trait
// ==========================================
// 实现者: CsvParser / SpreadsheetParser / UniversalFileParser
pub trait FileParser: Send + Sync {
    /// 解析文件为暂存行
    ///
    /// # 返回
    /// - Ok(Vec<StagedRow>): 数据行（不含表头，已跳过完全空白的行）
    /// - Err: 文件不存在、格式不支持或解析失败
    fn parse(&self, path: &Path) -> ImportResult<Vec<StagedRow>>;
}

/// 规范化表头: 去首尾空白，换行替换为下划线
fn normalize_header(raw: &str) -> String {
    raw.trim().replace("\r\n", "_").replace(['\r', '\n'], "_")
}

/// 重复表头加序号后缀: qty, qty_2, qty_3 ...
///
/// 空表头保持原样，由暂存时的表结构对齐丢弃
fn dedupe_headers(headers: Vec<String>, path: &Path) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut result = Vec::with_capacity(headers.len());

    for header in headers {
        if header.is_empty() || seen.insert(header.clone()) {
            result.push(header);
            continue;
        }

        let mut n = 2;
        let mut renamed = format!("{}_{}", header, n);
        while seen.contains(&renamed) {
            n += 1;
            renamed = format!("{}_{}", header, n);
        }
        warn!(path = %path.display(), header = %header, renamed = %renamed, "表头重复，已重命名");
        seen.insert(renamed.clone());
        result.push(renamed);
    }
    result
}

fn ensure_exists(path: &Path) -> ImportResult<()> {
    if !path.exists() {
        return Err(ImportError::FileNotFound(path.display().to_string()));
    }
    Ok(())
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

fn is_blank_row(row: &StagedRow) -> bool {
    row.values().all(|v| v.is_null())
}

// ==========================================
// CSV Parser 实现
// ==========================================
pub struct CsvParser;

impl FileParser for CsvParser {
    fn parse(&self, path: &Path) -> ImportResult<Vec<StagedRow>> {
        ensure_exists(path)?;

        let ext = extension_of(path);
        if ext != "csv" {
            return Err(ImportError::UnsupportedFormat(ext));
        }

        let file = File::open(path)?;
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true) // 允许行长度不一致
            .from_reader(file);

        let headers = dedupe_headers(
            reader.headers()?.iter().map(normalize_header).collect(),
            path,
        );

        let mut rows = Vec::new();
        for result in reader.records() {
            let record = result?;
            let mut row = StagedRow::new();

            for (idx, header) in headers.iter().enumerate() {
                let value = record.get(idx).map(|v| v.trim()).unwrap_or("");
                let value = if value.is_empty() {
                    serde_json::Value::Null
                } else {
                    serde_json::Value::String(value.to_string())
                };
                row.insert(header.clone(), value);
            }

            // 跳过完全空白的行
            if is_blank_row(&row) {
                continue;
            }
            rows.push(row);
        }

        tracing::debug!(path = %path.display(), rows = rows.len(), "CSV 解析完成");
        Ok(rows)
    }
}

// ==========================================
// Spreadsheet Parser 实现
// ==========================================
pub struct SpreadsheetParser;

impl SpreadsheetParser {
    /// 单元格 -> JSON 值
    ///
    /// 整数/浮点/布尔保留类型，日期单元格转为电子表格序列号
    fn cell_value(cell: &Data) -> serde_json::Value {
        match cell {
            Data::Empty => serde_json::Value::Null,
            Data::Int(i) => serde_json::Value::from(*i),
            Data::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Data::Bool(b) => serde_json::Value::Bool(*b),
            Data::DateTime(dt) => serde_json::Number::from_f64(dt.as_f64())
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    serde_json::Value::Null
                } else {
                    serde_json::Value::String(trimmed.to_string())
                }
            }
            Data::Error(e) => serde_json::Value::String(e.to_string()),
        }
    }
}

impl FileParser for SpreadsheetParser {
    fn parse(&self, path: &Path) -> ImportResult<Vec<StagedRow>> {
        ensure_exists(path)?;

        let ext = extension_of(path);
        if !matches!(ext.as_str(), "xlsx" | "xlsm" | "xlsb" | "xls" | "ods") {
            return Err(ImportError::UnsupportedFormat(ext));
        }

        let mut workbook = open_workbook_auto(path)?;

        // 只读取第一个工作表
        let sheet_name = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| ImportError::ExcelParseError("工作簿没有工作表".to_string()))?;
        let range = workbook.worksheet_range(&sheet_name)?;

        let mut iter = range.rows();
        let headers = match iter.next() {
            Some(header_row) => dedupe_headers(
                header_row
                    .iter()
                    .map(|cell| normalize_header(&cell.to_string()))
                    .collect(),
                path,
            ),
            None => return Ok(Vec::new()),
        };

        let mut rows = Vec::new();
        for data_row in iter {
            let mut row = StagedRow::new();
            for (idx, header) in headers.iter().enumerate() {
                let value = data_row
                    .get(idx)
                    .map(Self::cell_value)
                    .unwrap_or(serde_json::Value::Null);
                row.insert(header.clone(), value);
            }

            // 跳过完全空白的行
            if is_blank_row(&row) {
                continue;
            }
            rows.push(row);
        }

        tracing::debug!(
            path = %path.display(),
            sheet = %sheet_name,
            rows = rows.len(),
            "电子表格解析完成"
        );
        Ok(rows)
    }
}

// ==========================================
// 通用文件解析器（根据扩展名自动选择）
// ==========================================
pub struct UniversalFileParser;

impl FileParser for UniversalFileParser {
    fn parse(&self, path: &Path) -> ImportResult<Vec<StagedRow>> {
        match extension_of(path).as_str() {
            "csv" => CsvParser.parse(path),
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => SpreadsheetParser.parse(path),
            other => {
                ensure_exists(path)?;
                Err(ImportError::UnsupportedFormat(other.to_string()))
            }
        }
    }
}
