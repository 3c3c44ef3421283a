// ==========================================
// 文件导入管道 - 基于存储的比对检查
// ==========================================
// 职责: 缺失字段、参照存在、日期有效、数值有效
// 输出: 未通过的行 id + 需回写的规范化值
// 说明: 检查本身不改写暂存表，回写由引擎在得出结论后显式执行
// ==========================================

use crate::comparison::primitives::{coerce_float, display_value, valid_date};
use crate::domain::comparison::Normalization;
use crate::domain::types::StagedRow;
use crate::i18n::t_with_args;
use crate::repository::error::RepositoryResult;
use crate::repository::staging_repo::StagingRepository;

/// 单次检查结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckOutcome {
    pub failing_ids: Vec<i64>,
    pub normalized: Vec<Normalization>,
}

impl CheckOutcome {
    fn failing(failing_ids: Vec<i64>) -> Self {
        Self {
            failing_ids,
            normalized: Vec::new(),
        }
    }
}

/// 指定列为 null 的行
///
/// 0、空串等“假值”但非 null 的值视为存在
pub async fn missing_field(
    repo: &dyn StagingRepository,
    table: &str,
    column: &str,
) -> RepositoryResult<CheckOutcome> {
    Ok(CheckOutcome::failing(repo.null_ids(table, column).await?))
}

/// 指定列的值在参照表中不存在的行
///
/// # 参数
/// - nullable: false 时 null 视为失败；true 时 null 自动通过
pub async fn existing_reference(
    repo: &dyn StagingRepository,
    table: &str,
    column: &str,
    reference_table: &str,
    reference_key: &str,
    nullable: bool,
) -> RepositoryResult<CheckOutcome> {
    let ids = repo
        .unmatched_reference_ids(table, column, reference_table, reference_key, nullable)
        .await?;
    Ok(CheckOutcome::failing(ids))
}

/// 指定列无法解析为日期的行
///
/// 可解析的值按 format 规范化；值已是规范格式时不产生回写
pub async fn valid_date_check(
    repo: &dyn StagingRepository,
    table: &str,
    column: &str,
    format: &str,
    nullable: bool,
) -> RepositoryResult<CheckOutcome> {
    let mut outcome = CheckOutcome::default();

    for (id, value) in repo.column_values(table, column).await? {
        if value.is_null() {
            if !nullable {
                outcome.failing_ids.push(id);
            }
            continue;
        }

        match valid_date(&value, format) {
            Some(normalized) => {
                let normalized = serde_json::Value::String(normalized);
                if normalized != value {
                    outcome.normalized.push(Normalization {
                        id,
                        column: column.to_string(),
                        value: normalized,
                    });
                }
            }
            None => outcome.failing_ids.push(id),
        }
    }

    Ok(outcome)
}

/// 指定列无法转换为浮点数的行（null 视为失败，0 视为有效）
pub async fn valid_numeric_check(
    repo: &dyn StagingRepository,
    table: &str,
    column: &str,
) -> RepositoryResult<CheckOutcome> {
    let mut outcome = CheckOutcome::default();

    for (id, value) in repo.column_values(table, column).await? {
        match coerce_float(&value) {
            Some(f) => {
                if value.as_f64() != Some(f) {
                    if let Some(number) = serde_json::Number::from_f64(f) {
                        outcome.normalized.push(Normalization {
                            id,
                            column: column.to_string(),
                            value: serde_json::Value::Number(number),
                        });
                    }
                }
            }
            None => outcome.failing_ids.push(id),
        }
    }

    Ok(outcome)
}

/// 参照查找结果
#[derive(Debug, Clone, PartialEq)]
pub enum ReferenceLookup {
    Found(StagedRow),
    /// 未找到时的可读消息
    Missing(String),
}

/// 在参照表中查找一条记录，找不到时给出可读消息
///
/// 供自定义比对与落库回调在逐行处理时复用
pub async fn reference_message(
    repo: &dyn StagingRepository,
    table: &str,
    key: &str,
    value: &serde_json::Value,
) -> RepositoryResult<ReferenceLookup> {
    match repo.find_reference(table, key, value).await? {
        Some(row) => Ok(ReferenceLookup::Found(row)),
        None => Ok(ReferenceLookup::Missing(t_with_args(
            "comparison.reference_missing",
            &[("table", table), ("key", key), ("value", &display_value(value))],
        ))),
    }
}
