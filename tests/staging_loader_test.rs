// ==========================================
// 暂存加载集成测试
// ==========================================
// 测试目标: 文件解析 -> 表结构对齐 -> 清空 -> 逐行写入 -> 作业明细
// ==========================================

mod test_helpers;

use file_import_pipeline::db::open_sqlite_connection;
use file_import_pipeline::domain::{InsertTolerance, StagingStatus};
use file_import_pipeline::importer::{detail_labels, StagingLoader};
use file_import_pipeline::logging;
use file_import_pipeline::pipeline::JobTracker;
use file_import_pipeline::repository::{JobLogRepository, SqliteStagingRepository};
use std::sync::{Arc, Mutex};

struct Fixture {
    _db_file: tempfile::NamedTempFile,
    db_path: String,
    jobs: Arc<JobLogRepository>,
    loader: StagingLoader,
}

fn setup() -> Fixture {
    let (db_file, db_path) = test_helpers::create_test_db().expect("创建测试数据库失败");
    let conn = Arc::new(Mutex::new(
        open_sqlite_connection(&db_path).expect("打开数据库失败"),
    ));
    let jobs = Arc::new(JobLogRepository::new(conn.clone()));
    let loader = StagingLoader::new(
        Arc::new(SqliteStagingRepository::new(conn)),
        jobs.clone() as Arc<dyn JobTracker>,
    );
    Fixture {
        _db_file: db_file,
        db_path,
        jobs,
        loader,
    }
}

fn new_job(f: &Fixture, table: &str) -> i64 {
    f.jobs
        .initiate_job(&format!("Upload - {}", table), "test")
        .expect("创建作业失败")
}

#[tokio::test]
async fn test_extra_column_is_dropped_from_every_row() {
    logging::init_test();
    let f = setup();
    let job_id = new_job(&f, "staging_orders");

    let upload = test_helpers::fixture_upload("orders_valid.csv");
    let result = f
        .loader
        .stage_file(job_id, &upload.path, "staging_orders", InsertTolerance::Strict)
        .await;

    assert!(result.is_success(), "暂存应成功: {}", result.message);
    assert_eq!(result.outcome.inserted, 3);
    assert_eq!(result.outcome.dropped_columns, vec!["legacy_notes".to_string()]);

    let rows = test_helpers::staged_rows(&f.db_path, "staging_orders").unwrap();
    assert_eq!(rows.len(), 3);
    for row in &rows {
        assert!(row.get("legacy_notes").is_none());
    }
}

#[tokio::test]
async fn test_rows_without_target_columns_are_skipped() {
    logging::init_test();
    let f = setup();
    let dir = tempfile::tempdir().unwrap();
    let job_id = new_job(&f, "staging_orders");

    let upload = test_helpers::write_upload(
        dir.path(),
        "foreign.csv",
        "warehouse,bin\nW1,A-01\nW2,B-07\n",
    )
    .unwrap();
    let result = f
        .loader
        .stage_file(job_id, &upload.path, "staging_orders", InsertTolerance::Strict)
        .await;

    assert_eq!(result.outcome.record_count, 2);
    assert_eq!(result.outcome.inserted, 0);
    assert_eq!(result.outcome.skipped, 2);
    assert_eq!(result.outcome.errored, 0);
    let rows = test_helpers::staged_rows(&f.db_path, "staging_orders").unwrap();
    assert!(rows.is_empty(), "不应写入默认值行");
}

#[tokio::test]
async fn test_staging_replaces_previous_content() {
    logging::init_test();
    let f = setup();
    let dir = tempfile::tempdir().unwrap();

    let first = test_helpers::write_upload(
        dir.path(),
        "first.csv",
        "sku,qty,ship_date,customer_code\nOLD-1,1,2024-01-01,C001\nOLD-2,2,2024-01-02,C002\n",
    )
    .unwrap();
    let second = test_helpers::write_upload(
        dir.path(),
        "second.csv",
        "sku,qty,ship_date,customer_code\nNEW-1,5,2024-02-01,C001\n",
    )
    .unwrap();

    let job_id = new_job(&f, "staging_orders");
    let r1 = f
        .loader
        .stage_file(job_id, &first.path, "staging_orders", InsertTolerance::Strict)
        .await;
    assert!(r1.is_success());

    let job_id = new_job(&f, "staging_orders");
    let r2 = f
        .loader
        .stage_file(job_id, &second.path, "staging_orders", InsertTolerance::Strict)
        .await;
    assert!(r2.is_success());

    let rows = test_helpers::staged_rows(&f.db_path, "staging_orders").unwrap();
    let skus: Vec<&str> = rows.iter().filter_map(|r| r["sku"].as_str()).collect();
    assert_eq!(skus, vec!["NEW-1"], "暂存表只应包含本次文件的数据");
    // 自增序列随清空重置
    assert_eq!(rows[0]["id"], serde_json::json!(1));
}

#[tokio::test]
async fn test_tolerant_table_skips_failed_rows() {
    logging::init_test();
    let f = setup();
    let job_id = new_job(&f, "staging_lots");

    let upload = test_helpers::fixture_upload("lots_with_duplicates.csv");
    let result = f
        .loader
        .stage_file(job_id, &upload.path, "staging_lots", InsertTolerance::SkipFailedRows)
        .await;

    assert_eq!(result.status, StagingStatus::Success);
    assert_eq!(result.outcome.record_count, 5);
    assert_eq!(result.outcome.inserted, 3);
    assert_eq!(result.outcome.skipped, 2);
    assert_eq!(result.outcome.errored, 0);
    assert!(result.outcome.failed_rows.is_empty());
}

#[tokio::test]
async fn test_strict_table_reports_failed_rows() {
    logging::init_test();
    let f = setup();
    let job_id = new_job(&f, "staging_lots");

    let upload = test_helpers::fixture_upload("lots_with_duplicates.csv");
    let result = f
        .loader
        .stage_file(job_id, &upload.path, "staging_lots", InsertTolerance::Strict)
        .await;

    assert_eq!(result.status, StagingStatus::Failed);
    assert_eq!(result.status.code(), 400);
    assert_eq!(result.outcome.errored, 2);
    assert_eq!(result.outcome.skipped, 0);
    assert_eq!(result.outcome.inserted, 3);

    let indexes: Vec<usize> = result.outcome.failed_rows.iter().map(|r| r.row_index).collect();
    assert_eq!(indexes, vec![2, 4]);
    for failed in &result.outcome.failed_rows {
        assert!(!failed.error.is_empty(), "失败行应携带错误信息");
    }

    let content = result.content();
    assert_eq!(content.as_array().map(|a| a.len()), Some(2));
}

#[tokio::test]
async fn test_unreadable_file_is_fatal_and_stages_nothing() {
    logging::init_test();
    let f = setup();

    // 先放入一批数据
    let job_id = new_job(&f, "staging_orders");
    let upload = test_helpers::fixture_upload("orders_valid.csv");
    f.loader
        .stage_file(job_id, &upload.path, "staging_orders", InsertTolerance::Strict)
        .await;

    let job_id = new_job(&f, "staging_orders");
    let missing = std::path::Path::new("/definitely/not/here/orders.csv");
    let result = f
        .loader
        .stage_file(job_id, missing, "staging_orders", InsertTolerance::Strict)
        .await;

    assert_eq!(result.status, StagingStatus::Fatal);
    assert_eq!(result.status.code(), 500);
    assert_eq!(result.outcome.record_count, 0);

    // 解析失败时不清空暂存表
    let rows = test_helpers::staged_rows(&f.db_path, "staging_orders").unwrap();
    assert_eq!(rows.len(), 3);
}

#[tokio::test]
async fn test_counts_recorded_as_job_details() {
    logging::init_test();
    let f = setup();
    let job_id = new_job(&f, "staging_lots");

    let upload = test_helpers::fixture_upload("lots_with_duplicates.csv");
    f.loader
        .stage_file(job_id, &upload.path, "staging_lots", InsertTolerance::SkipFailedRows)
        .await;

    let job = f.jobs.get_job(job_id).expect("读取作业失败");
    let detail = |label: &str| {
        job.details
            .iter()
            .find(|d| d.label == label)
            .map(|d| d.value.clone())
    };

    assert_eq!(detail(detail_labels::RECORD_COUNT).as_deref(), Some("5"));
    assert_eq!(detail(detail_labels::SKIPPED_COUNT).as_deref(), Some("2"));
    assert_eq!(detail(detail_labels::INSERT_COUNT).as_deref(), Some("3"));
    assert_eq!(detail(detail_labels::ERROR_COUNT).as_deref(), Some("0"));
    assert_eq!(detail(detail_labels::TRUNCATED).as_deref(), Some("staging_lots"));
}
