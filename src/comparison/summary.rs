// ==========================================
// 文件导入管道 - 结果汇总
// ==========================================
// 职责: 把 transform/load 阶段的新增、更新、删除、错误汇总为
//       一句可读消息 + 分类记录包 + 成功标志 + 空文件标志
// ==========================================
// 说明: 空文件（四类均为空）是独立终态，既不是成功也不是校验失败
// ==========================================

use crate::domain::comparison::{LoadPhase, LoadSummary, RecordBundle};
use crate::i18n::t_with_args;
use std::collections::BTreeMap;

// 记录包键名
pub const TRANSFORMED_KEY: &str = "transformed_data";
pub const NEW_KEY: &str = "new_data";
pub const UPDATED_KEY: &str = "updated_data";
pub const DELETED_KEY: &str = "deleted_data";

/// 汇总一个阶段的结果
///
/// # 参数
/// - phase: Transform / Load
/// - model_type: 模型名（单数），消息中会自动复数化
/// - errors / new: 错误记录、新建记录
/// - updated / deleted: None 表示该阶段不涉及此类别
pub fn summarize(
    phase: LoadPhase,
    model_type: &str,
    errors: &[serde_json::Value],
    new: &[serde_json::Value],
    updated: Option<&[serde_json::Value]>,
    deleted: Option<&[serde_json::Value]>,
) -> LoadSummary {
    let models = pluralize(model_type);
    let new_count = new.len().to_string();
    let error_count = errors.len().to_string();

    let (key, success_key) = match phase {
        LoadPhase::Transform => ("summary.transform", TRANSFORMED_KEY),
        LoadPhase::Load => ("summary.load", NEW_KEY),
    };

    let mut message = t_with_args(
        key,
        &[
            ("model", model_type),
            ("models", &models),
            ("errors", &error_count),
            ("count", &new_count),
        ],
    );

    let mut successful = BTreeMap::new();
    successful.insert(success_key.to_string(), RecordBundle::new(new.to_vec()));

    let has_items = |list: Option<&[serde_json::Value]>| list.map_or(false, |l| !l.is_empty());

    // 只要更新或删除任一类非空，所有“已提供”的类别都写进消息（含空列表）
    if has_items(updated) || has_items(deleted) {
        if let Some(list) = updated {
            message.push_str(&t_with_args(
                "summary.updated",
                &[("count", &list.len().to_string()), ("models", &models)],
            ));
            successful.insert(UPDATED_KEY.to_string(), RecordBundle::new(list.to_vec()));
        }
        if let Some(list) = deleted {
            message.push_str(&t_with_args(
                "summary.deleted",
                &[("count", &list.len().to_string()), ("models", &models)],
            ));
            successful.insert(DELETED_KEY.to_string(), RecordBundle::new(list.to_vec()));
        }
    }
    message.push('.');

    let empty = !has_items(updated) && !has_items(deleted) && new.is_empty() && errors.is_empty();
    let success = !empty && (!new.is_empty() || has_items(updated) || has_items(deleted));

    LoadSummary {
        message,
        success,
        empty,
        successful,
        failed: RecordBundle::new(errors.to_vec()),
    }
}

/// 英文名词复数（覆盖常见规则）
pub fn pluralize(word: &str) -> String {
    if word.is_empty() {
        return String::new();
    }
    let lower = word.to_lowercase();
    if lower.ends_with('y')
        && !lower.ends_with("ay")
        && !lower.ends_with("ey")
        && !lower.ends_with("oy")
        && !lower.ends_with("uy")
    {
        return format!("{}ies", &word[..word.len() - 1]);
    }
    if lower.ends_with('s')
        || lower.ends_with('x')
        || lower.ends_with('z')
        || lower.ends_with("ch")
        || lower.ends_with("sh")
    {
        return format!("{}es", word);
    }
    format!("{}s", word)
}
