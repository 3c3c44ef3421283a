// ==========================================
// 文件导入管道 - 暂存加载器 (Staging Loader)
// ==========================================
// 流程:
// 1. 表结构对齐: 丢弃第 0 行中目标表不存在的列
// 2. 无条件清空目标表（全量替换，不追加）
// 3. 逐行写入；单行失败不中断批次
// 4. 行数写入作业明细
// 5. errored == 0 为成功（200），否则失败（400）；源文件解析失败为致命（500）
// ==========================================

use crate::domain::staging::{
    FailedRow, InsertOutcome, SchemaReconciliation, StagingResult, StagingStatus,
};
use crate::domain::types::{InsertTolerance, StagedRow};
use crate::i18n::{t, t_with_args};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::file_parser::{FileParser, UniversalFileParser};
use crate::pipeline::tracker::JobTracker;
use crate::repository::staging_repo::StagingRepository;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

// 每写入多少行让出一次执行权（使外层超时能够生效）
const YIELD_EVERY: usize = 500;

// 作业明细标签
pub mod detail_labels {
    pub const IMPORT_FIELDS: &str = "Import fields";
    pub const TRUNCATED: &str = "Truncated";
    pub const RECORD_COUNT: &str = "Record count";
    pub const SKIPPED_COUNT: &str = "Skipped count";
    pub const INSERT_COUNT: &str = "Insert count";
    pub const ERROR_COUNT: &str = "Error count";
    pub const COMPARISONS: &str = "File Import Comparisons";
    pub const LOAD: &str = "File Import Load";
}

// ==========================================
// StagingLoader
// ==========================================
pub struct StagingLoader {
    repo: Arc<dyn StagingRepository>,
    tracker: Arc<dyn JobTracker>,
    parser: Arc<dyn FileParser>,
}

impl StagingLoader {
    pub fn new(repo: Arc<dyn StagingRepository>, tracker: Arc<dyn JobTracker>) -> Self {
        Self {
            repo,
            tracker,
            parser: Arc::new(UniversalFileParser),
        }
    }

    /// 替换文件解析器
    pub fn with_parser(mut self, parser: Arc<dyn FileParser>) -> Self {
        self.parser = parser;
        self
    }

    /// 解析文件并暂存
    ///
    /// 解析失败为致命结果，不进行任何暂存
    #[instrument(skip(self, path, tolerance))]
    pub async fn stage_file(
        &self,
        job_id: i64,
        path: &Path,
        table: &str,
        tolerance: InsertTolerance,
    ) -> StagingResult {
        let rows = match self.parse(path.to_path_buf()).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(job_id, path = %path.display(), error = %e, "导入文件解析失败");
                return StagingResult::fatal(fatal_message(&e));
            }
        };

        self.load(job_id, rows, table, tolerance).await
    }

    /// 暂存已解析的行
    #[instrument(skip(self, rows, tolerance), fields(rows = rows.len()))]
    pub async fn load(
        &self,
        job_id: i64,
        rows: Vec<StagedRow>,
        table: &str,
        tolerance: InsertTolerance,
    ) -> StagingResult {
        match self.try_load(job_id, rows, table, tolerance).await {
            Ok(result) => result,
            Err(e) => {
                warn!(job_id, table = %table, error = %e, "暂存失败");
                StagingResult::fatal(fatal_message(&e))
            }
        }
    }

    async fn parse(&self, path: PathBuf) -> ImportResult<Vec<StagedRow>> {
        let parser = Arc::clone(&self.parser);
        tokio::task::spawn_blocking(move || parser.parse(&path))
            .await
            .map_err(|e| ImportError::InternalError(format!("解析任务异常退出: {}", e)))?
    }

    async fn try_load(
        &self,
        job_id: i64,
        rows: Vec<StagedRow>,
        table: &str,
        tolerance: InsertTolerance,
    ) -> ImportResult<StagingResult> {
        // 1. 表结构对齐
        let reconciliation = match rows.first() {
            Some(first) => {
                let fields = first.keys().cloned().collect::<Vec<_>>().join(", ");
                self.record_detail(job_id, detail_labels::IMPORT_FIELDS, &fields)
                    .await;

                let target_columns = self.repo.table_columns(table).await?;
                SchemaReconciliation::reconcile(first, &target_columns)
            }
            None => SchemaReconciliation::default(),
        };

        if !reconciliation.dropped_columns.is_empty() {
            debug!(
                job_id,
                dropped = ?reconciliation.dropped_columns,
                "丢弃目标表不存在的列"
            );
        }

        // 2. 清空目标表
        self.repo.truncate(table).await?;
        self.record_detail(job_id, detail_labels::TRUNCATED, table).await;

        // 3. 逐行写入
        let mut outcome = InsertOutcome {
            record_count: rows.len(),
            dropped_columns: reconciliation.dropped_columns.iter().cloned().collect(),
            ..InsertOutcome::default()
        };

        for (idx, row) in rows.into_iter().enumerate() {
            let reduced = reconciliation.apply(&row);
            if reduced.is_empty() {
                // 列全部被丢弃的行不写入，不产生默认值行
                debug!(job_id, row = idx, "行内没有目标表的列，跳过");
                outcome.skipped += 1;
            } else {
                match self.repo.insert_row(table, &reduced).await {
                    Ok(()) => outcome.inserted += 1,
                    Err(e) if tolerance.skips_failures() => {
                        debug!(job_id, row = idx, error = %e, "行写入失败，按容忍策略跳过");
                        outcome.skipped += 1;
                    }
                    Err(e) => {
                        debug!(job_id, row = idx, error = %e, "行写入失败");
                        outcome.errored += 1;
                        outcome.failed_rows.push(FailedRow {
                            row_index: idx,
                            row,
                            error: e.to_string(),
                        });
                    }
                }
            }

            if (idx + 1) % YIELD_EVERY == 0 {
                tokio::task::yield_now().await;
            }
        }

        // 4. 行数写入作业明细
        self.record_detail(
            job_id,
            detail_labels::RECORD_COUNT,
            &outcome.record_count.to_string(),
        )
        .await;
        self.record_detail(job_id, detail_labels::SKIPPED_COUNT, &outcome.skipped.to_string())
            .await;
        self.record_detail(job_id, detail_labels::INSERT_COUNT, &outcome.inserted.to_string())
            .await;
        self.record_detail(job_id, detail_labels::ERROR_COUNT, &outcome.errored.to_string())
            .await;

        info!(
            job_id,
            table = %table,
            records = outcome.record_count,
            inserted = outcome.inserted,
            skipped = outcome.skipped,
            errored = outcome.errored,
            "暂存完成"
        );

        // 5. 结果状态
        let result = if outcome.errored == 0 {
            StagingResult {
                status: StagingStatus::Success,
                message: t_with_args("import.staging_succeeded", &[("table", table)]),
                outcome,
            }
        } else {
            StagingResult {
                status: StagingStatus::Failed,
                message: t("import.staging_partial"),
                outcome,
            }
        };
        Ok(result)
    }

    // 明细写入失败不影响暂存结果
    async fn record_detail(&self, job_id: i64, label: &str, value: &str) {
        if let Err(e) = self.tracker.add_detail(job_id, label, value).await {
            warn!(job_id, label = %label, error = %e, "作业明细写入失败");
        }
    }
}

fn fatal_message(err: &ImportError) -> String {
    t_with_args("import.parse_failed", &[("error", &err.to_string())])
}
