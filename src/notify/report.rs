// ==========================================
// 文件导入管道 - 校验失败报表
// ==========================================
// 职责: 每条未通过的比对规则导出一个 CSV，作为邮件附件
// 命名: <数据集>_<规则>_<Y-m-d-H-i-s>.csv
// ==========================================

use crate::comparison::primitives::display_value;
use crate::domain::comparison::ComparisonFailure;
use crate::notify::error::NotifyResult;
use crate::notify::notifier::Attachment;
use crate::repository::staging_repo::ID_COLUMN;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::path::Path;

const MESSAGE_COLUMN: &str = "message";

/// 报表文件名
pub fn report_filename(data_set: &str, comparison: &str, at: &DateTime<Utc>) -> String {
    format!(
        "{}_{}_{}.csv",
        data_set,
        comparison,
        at.format("%Y-%m-%d-%H-%M-%S")
    )
}

/// 写出单条规则的失败报表
///
/// # 参数
/// - dir: 输出目录（不存在时创建）
/// - data_set: 数据集名
/// - failure: 规则结果；没有记录但带说明时输出一行说明
///
/// # 返回
/// 可直接挂到邮件上的附件
pub fn write_failure_report(
    dir: &Path,
    data_set: &str,
    failure: &ComparisonFailure,
    at: &DateTime<Utc>,
) -> NotifyResult<Attachment> {
    std::fs::create_dir_all(dir)?;

    let filename = report_filename(data_set, &failure.comparison, at);
    let path = dir.join(&filename);
    let mut writer = csv::Writer::from_path(&path)?;

    if failure.records.is_empty() {
        let message = failure.message.clone().unwrap_or_default();
        writer.write_record([MESSAGE_COLUMN])?;
        writer.write_record([message.as_str()])?;
    } else {
        let columns = header(failure);
        writer.write_record(&columns)?;
        for record in &failure.records {
            let line: Vec<String> = columns
                .iter()
                .map(|c| record.get(c).map(display_value).unwrap_or_default())
                .collect();
            writer.write_record(&line)?;
        }
    }
    writer.flush()?;

    tracing::debug!(
        path = %path.display(),
        rows = failure.records.len(),
        "校验失败报表已生成"
    );
    Ok(Attachment { filename, path })
}

// 表头: 所有记录键的并集，id 固定在第一列
fn header(failure: &ComparisonFailure) -> Vec<String> {
    let keys: BTreeSet<&String> = failure.records.iter().flat_map(|r| r.keys()).collect();
    let mut columns = Vec::with_capacity(keys.len());
    if keys.iter().any(|k| k.as_str() == ID_COLUMN) {
        columns.push(ID_COLUMN.to_string());
    }
    columns.extend(
        keys.into_iter()
            .filter(|k| k.as_str() != ID_COLUMN)
            .cloned(),
    );
    columns
}
