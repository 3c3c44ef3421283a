// ==========================================
// 文件导入管道 - 比对规则引擎 (Comparison Engine)
// ==========================================
// 职责: 按名称对数据集执行单条比对规则，返回问题记录
// 规则来源: 数据集配置中的声明式规则 + 代码注册的自定义比对
// ==========================================
// 约束:
// - 未知数据集/未知规则/存储错误一律 row_count = 1，上传被拦截
// - 规则之间相互独立，不短路，一次收集全部失败
// ==========================================

use crate::comparison::checks::{self, CheckOutcome};
use crate::config::dataset_config::{DatasetConfig, DatasetRegistry, RuleDefinition};
use crate::domain::comparison::{ComparisonFailure, ValidationFailures};
use crate::domain::types::StagedRow;
use crate::i18n::t_with_args;
use crate::repository::error::RepositoryResult;
use crate::repository::staging_repo::StagingRepository;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

// ==========================================
// CustomComparison Trait
// ==========================================
// 用途: 声明式规则表达不了的比对（跨多列、跨多表）
#[async_trait]
pub trait CustomComparison: Send + Sync {
    /// 返回问题记录（每条记录应保留暂存表 id）
    async fn run(
        &self,
        repo: &dyn StagingRepository,
        dataset: &DatasetConfig,
    ) -> RepositoryResult<Vec<StagedRow>>;
}

// ==========================================
// ComparisonEngine
// ==========================================
pub struct ComparisonEngine {
    repo: Arc<dyn StagingRepository>,
    datasets: Arc<DatasetRegistry>,
    custom: HashMap<(String, String), Arc<dyn CustomComparison>>,
}

impl ComparisonEngine {
    pub fn new(repo: Arc<dyn StagingRepository>, datasets: Arc<DatasetRegistry>) -> Self {
        Self {
            repo,
            datasets,
            custom: HashMap::new(),
        }
    }

    /// 注册自定义比对（同名时优先于声明式规则）
    pub fn register_custom(
        &mut self,
        data_set: &str,
        comparison: &str,
        check: Arc<dyn CustomComparison>,
    ) {
        self.custom
            .insert((data_set.to_string(), comparison.to_string()), check);
    }

    /// 执行单条比对
    pub async fn run(&self, data_set: &str, comparison: &str) -> ComparisonFailure {
        let dataset = match self.datasets.get(data_set) {
            Ok(ds) => ds,
            Err(_) => {
                warn!(data_set = %data_set, comparison = %comparison, "比对数据集未配置");
                return ComparisonFailure::blocked(
                    comparison,
                    t_with_args("comparison.unknown_dataset", &[("dataset", data_set)]),
                );
            }
        };

        let key = (data_set.to_string(), comparison.to_string());
        let result = if let Some(custom) = self.custom.get(&key) {
            custom
                .run(self.repo.as_ref(), dataset)
                .await
                .map(|records| ComparisonFailure::from_records(comparison, records))
        } else if let Some(rule) = dataset.rules.get(comparison) {
            self.run_rule(dataset, comparison, rule).await
        } else {
            warn!(data_set = %data_set, comparison = %comparison, "比对规则未配置");
            return ComparisonFailure::blocked(
                comparison,
                t_with_args(
                    "comparison.unknown_comparison",
                    &[("comparison", comparison), ("dataset", data_set)],
                ),
            );
        };

        match result {
            Ok(failure) => {
                debug!(
                    data_set = %data_set,
                    comparison = %comparison,
                    row_count = failure.row_count,
                    normalized = failure.normalized.len(),
                    "比对完成"
                );
                failure
            }
            Err(e) => {
                warn!(data_set = %data_set, comparison = %comparison, error = %e, "比对执行失败");
                ComparisonFailure::blocked(
                    comparison,
                    t_with_args(
                        "comparison.check_error",
                        &[("comparison", comparison), ("error", &e.to_string())],
                    ),
                )
            }
        }
    }

    /// 按配置顺序执行数据集的全部比对，返回未通过的规则
    pub async fn run_all(&self, data_set: &str) -> ValidationFailures {
        let mut failures = ValidationFailures::new();

        let comparisons = match self.datasets.get(data_set) {
            Ok(ds) => ds.comparisons.clone(),
            Err(_) => {
                let failure = self.run(data_set, data_set).await;
                failures.insert(data_set.to_string(), failure);
                return failures;
            }
        };

        for comparison in &comparisons {
            let failure = self.run(data_set, comparison).await;
            if !failure.passed() {
                failures.insert(comparison.clone(), failure);
            }
        }

        info!(
            data_set = %data_set,
            rules = comparisons.len(),
            failed = failures.len(),
            "数据集校验完成"
        );
        failures
    }

    async fn run_rule(
        &self,
        dataset: &DatasetConfig,
        comparison: &str,
        rule: &RuleDefinition,
    ) -> RepositoryResult<ComparisonFailure> {
        let repo = self.repo.as_ref();
        let table = dataset.staging_table.as_str();

        let (outcome, projection): (CheckOutcome, &[String]) = match rule {
            RuleDefinition::MissingField { column } => {
                (checks::missing_field(repo, table, column).await?, &[])
            }
            RuleDefinition::ExistingReference {
                column,
                reference_table,
                reference_key,
                nullable,
                projection,
            } => (
                checks::existing_reference(
                    repo,
                    table,
                    column,
                    reference_table,
                    reference_key,
                    *nullable,
                )
                .await?,
                projection.as_slice(),
            ),
            RuleDefinition::ValidDate {
                column,
                format,
                nullable,
            } => (
                checks::valid_date_check(repo, table, column, format, *nullable).await?,
                &[],
            ),
            RuleDefinition::ValidNumeric { column } => {
                (checks::valid_numeric_check(repo, table, column).await?, &[])
            }
        };

        // 先得出结论，再显式回写规范化值
        if !outcome.normalized.is_empty() {
            let written = repo.apply_normalizations(table, &outcome.normalized).await?;
            debug!(table = %table, comparison = %comparison, written, "规范化值已回写");
        }

        let records = repo.fetch_rows(table, &outcome.failing_ids, projection).await?;
        Ok(ComparisonFailure {
            comparison: comparison.to_string(),
            row_count: outcome.failing_ids.len(),
            records,
            message: None,
            normalized: outcome.normalized,
        })
    }
}
