// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 临时数据库、暂存/参照表、数据集与模板配置、
//       记录型通知器、脚本化落库实现
// ==========================================
#![allow(dead_code)]

use async_trait::async_trait;
use file_import_pipeline::app::{PipelineParts, PipelineState};
use file_import_pipeline::config::config_keys;
use file_import_pipeline::config::{ConfigManager, DatasetRegistry};
use file_import_pipeline::db::{init_pipeline_schema, open_sqlite_connection};
use file_import_pipeline::domain::{TableStatus, UploadedFile};
use file_import_pipeline::notify::{
    NotificationMessage, Notifier, NotifyResult, Recipient, TemplateId, TemplateRegistry,
};
use file_import_pipeline::pipeline::DatasetLoader;
use rusqlite::Connection;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

// ==========================================
// 配置
// ==========================================

pub const DATASETS_JSON: &str = r#"{
    "datasets": [
        {
            "name": "orders",
            "readable_name": "Orders",
            "staging_table": "staging_orders",
            "comparisons": ["missing_sku", "customer_exists", "valid_ship_date", "valid_qty"],
            "rules": {
                "missing_sku": {"check": "missing_field", "column": "sku"},
                "customer_exists": {
                    "check": "existing_reference",
                    "column": "customer_code",
                    "reference_table": "customers",
                    "reference_key": "code"
                },
                "valid_ship_date": {"check": "valid_date", "column": "ship_date"},
                "valid_qty": {"check": "valid_numeric", "column": "qty"}
            },
            "conflicting_tables": ["staging_lots"]
        },
        {
            "name": "lots",
            "readable_name": "Lot Codes",
            "staging_table": "staging_lots",
            "insert_tolerance": "skip_failed_rows",
            "queue": "lot_import"
        },
        {
            "name": "lots_strict",
            "readable_name": "Strict Lot Codes",
            "staging_table": "staging_lots"
        }
    ]
}"#;

pub const TEMPLATES_JSON: &str = r#"{
    "templates": [
        {"id": "staging_error", "subject": "File import staging error", "body": "The file could not be staged."},
        {"id": "no_data", "subject": "File import contained no data", "body": "The file did not contain any data."},
        {"id": "unprocessed", "subject": "File import not processed", "body": "The file could not be processed."},
        {"id": "missing_file", "subject": "File import missing file", "body": "No file was attached."},
        {
            "id": "orders",
            "subject": "Orders file import",
            "body": "Orders import notification.",
            "reprocess_slug": "orders-upload",
            "subscribers": [
                {"email": "ops@example.com", "name": "Ops", "phone": "+15550100", "send_via_sms": true},
                {"email": "audit@example.com", "name": "Audit"}
            ]
        },
        {"id": "lots", "subject": "Lot codes file import", "body": "Lot codes import notification."}
    ]
}"#;

// ==========================================
// 数据库
// ==========================================

/// 创建临时测试数据库并初始化 schema 与夹具表
///
/// # 返回
/// - NamedTempFile: 临时数据库文件（需要保持存活）
/// - String: 数据库文件路径
pub fn create_test_db() -> Result<(NamedTempFile, String), Box<dyn Error>> {
    let temp_file = NamedTempFile::new()?;
    let db_path = temp_file
        .path()
        .to_str()
        .ok_or("临时文件路径不是合法 UTF-8")?
        .to_string();

    let conn = open_sqlite_connection(&db_path)?;
    init_pipeline_schema(&conn)?;
    create_fixture_tables(&conn)?;

    Ok((temp_file, db_path))
}

/// 暂存表与参照表
pub fn create_fixture_tables(conn: &Connection) -> Result<(), Box<dyn Error>> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS staging_orders (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            sku TEXT,
            qty REAL,
            ship_date TEXT,
            customer_code TEXT
        );

        CREATE TABLE IF NOT EXISTS staging_lots (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            lot_code TEXT NOT NULL UNIQUE,
            sku TEXT
        );

        CREATE TABLE IF NOT EXISTS customers (
            code TEXT PRIMARY KEY,
            name TEXT NOT NULL
        );

        INSERT OR IGNORE INTO customers (code, name) VALUES ('C001', 'Northwind');
        INSERT OR IGNORE INTO customers (code, name) VALUES ('C002', 'Contoso');
        "#,
    )?;
    Ok(())
}

/// 写入管道运行参数（在组装 PipelineState 之前调用）
pub fn set_config(db_path: &str, pairs: &[(&str, &str)]) -> Result<(), Box<dyn Error>> {
    let manager = ConfigManager::new(db_path)?;
    for (key, value) in pairs {
        manager.set_global_config_value(key, value)?;
    }
    Ok(())
}

/// 测试默认参数: 冲突重入队不延迟，报表写到临时目录
pub fn configure_for_tests(db_path: &str, report_dir: &Path) -> Result<(), Box<dyn Error>> {
    set_config(
        db_path,
        &[
            (config_keys::WAIT_TIME_SECS, "0"),
            (config_keys::POLL_INTERVAL_MS, "10"),
            (config_keys::ADMIN_EMAIL, "admin@example.com"),
            (config_keys::ADMIN_NAME, "Admin"),
            (config_keys::BASE_URL, "https://imports.example.com"),
            (
                config_keys::REPORT_DIR,
                report_dir.to_str().ok_or("报表目录不是合法 UTF-8")?,
            ),
        ],
    )
}

/// 读取暂存表全部行（按 id）
pub fn staged_rows(db_path: &str, table: &str) -> Result<Vec<serde_json::Value>, Box<dyn Error>> {
    let conn = Connection::open(db_path)?;
    let mut stmt = conn.prepare(&format!("SELECT * FROM \"{}\" ORDER BY id", table))?;
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
    let rows = stmt.query_map([], |row| {
        let mut map = serde_json::Map::new();
        for (i, name) in columns.iter().enumerate() {
            let value = match row.get_ref(i)? {
                rusqlite::types::ValueRef::Null => serde_json::Value::Null,
                rusqlite::types::ValueRef::Integer(n) => serde_json::json!(n),
                rusqlite::types::ValueRef::Real(f) => serde_json::json!(f),
                rusqlite::types::ValueRef::Text(t) => {
                    serde_json::Value::String(String::from_utf8_lossy(t).to_string())
                }
                rusqlite::types::ValueRef::Blob(_) => serde_json::Value::Null,
            };
            map.insert(name.clone(), value);
        }
        Ok(serde_json::Value::Object(map))
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

// ==========================================
// 文件
// ==========================================

pub fn fixture_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

pub fn fixture_upload(name: &str) -> UploadedFile {
    UploadedFile::new(name, fixture_path(name))
}

/// 在临时目录写一个 CSV 上传文件
pub fn write_upload(dir: &Path, name: &str, content: &str) -> Result<UploadedFile, Box<dyn Error>> {
    let path = dir.join(name);
    std::fs::write(&path, content)?;
    Ok(UploadedFile::new(name, path))
}

// ==========================================
// RecordingNotifier - 记录所有通知
// ==========================================
#[derive(Default)]
pub struct RecordingNotifier {
    pub emails: Mutex<Vec<(TemplateId, NotificationMessage)>>,
    pub sms: Mutex<Vec<(Vec<Recipient>, String)>>,
}

impl RecordingNotifier {
    pub fn templates_sent(&self) -> Vec<TemplateId> {
        self.emails
            .lock()
            .unwrap()
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn emails(&self) -> Vec<NotificationMessage> {
        self.emails
            .lock()
            .unwrap()
            .iter()
            .map(|(_, m)| m.clone())
            .collect()
    }

    pub fn count_subject(&self, needle: &str) -> usize {
        self.emails
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, m)| m.subject.contains(needle))
            .count()
    }

    pub fn sms_count(&self) -> usize {
        self.sms.lock().unwrap().len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(
        &self,
        template: &TemplateId,
        message: &NotificationMessage,
    ) -> NotifyResult<()> {
        self.emails
            .lock()
            .unwrap()
            .push((template.clone(), message.clone()));
        Ok(())
    }

    async fn notify_sms(&self, recipients: &[Recipient], text: &str) -> NotifyResult<()> {
        self.sms
            .lock()
            .unwrap()
            .push((recipients.to_vec(), text.to_string()));
        Ok(())
    }
}

// ==========================================
// ScriptedLoader - 返回预设状态的落库实现
// ==========================================
pub struct ScriptedLoader {
    result: Result<Vec<TableStatus>, String>,
    calls: AtomicUsize,
}

impl ScriptedLoader {
    pub fn returning(statuses: Vec<TableStatus>) -> Arc<Self> {
        Arc::new(Self {
            result: Ok(statuses),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            result: Err(message.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DatasetLoader for ScriptedLoader {
    async fn commit(&self) -> anyhow::Result<Vec<TableStatus>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone().map_err(|e| anyhow::anyhow!(e))
    }
}

// ==========================================
// 组装
// ==========================================

/// 测试环境
pub struct TestPipeline {
    pub _db_file: NamedTempFile,
    pub db_path: String,
    pub report_dir: tempfile::TempDir,
    pub notifier: Arc<RecordingNotifier>,
    pub state: PipelineState,
}

/// 组装完整管道
///
/// # 参数
/// - loaders: (数据集名, 落库实现)
/// - extra_config: 额外运行参数
pub fn build_pipeline(
    loaders: Vec<(&str, Arc<dyn DatasetLoader>)>,
    extra_config: &[(&str, &str)],
) -> Result<TestPipeline, Box<dyn Error>> {
    let (db_file, db_path) = create_test_db()?;
    let report_dir = tempfile::tempdir()?;
    configure_for_tests(&db_path, report_dir.path())?;
    set_config(&db_path, extra_config)?;

    let notifier = Arc::new(RecordingNotifier::default());
    let mut parts = PipelineParts::new(
        DatasetRegistry::from_json(DATASETS_JSON)?,
        TemplateRegistry::from_json(TEMPLATES_JSON)?,
        notifier.clone(),
    );
    for (data_set, loader) in loaders {
        parts = parts.with_loader(data_set, loader);
    }

    let state = PipelineState::new(&db_path, parts)?;
    Ok(TestPipeline {
        _db_file: db_file,
        db_path,
        report_dir,
        notifier,
        state,
    })
}
