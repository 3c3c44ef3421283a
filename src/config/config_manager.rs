// ==========================================
// 文件导入管道 - 配置管理器
// ==========================================
// 职责: 管道运行参数的加载、查询、覆写
// 存储: config_kv 表 (key-value + scope)，仅使用 global scope
// ==========================================

use crate::config::error::{ConfigError, ConfigResult};
use crate::db::open_sqlite_connection;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 调度
    pub const WAIT_TIME_SECS: &str = "import/wait_time_secs";
    pub const MAX_ATTEMPTS: &str = "import/max_attempts";
    pub const POLL_INTERVAL_MS: &str = "import/poll_interval_ms";

    // 暂存
    pub const STAGING_TIMEOUT_SECS: &str = "import/staging_timeout_secs";
    pub const CONTINUE_QUEUED_AFTER_STAGING_FAILURE: &str =
        "import/continue_queued_after_staging_failure";

    // 通知
    pub const ADMIN_EMAIL: &str = "notify/admin_email";
    pub const ADMIN_NAME: &str = "notify/admin_name";
    pub const BASE_URL: &str = "notify/base_url";
    pub const REPORT_DIR: &str = "notify/report_dir";
    pub const LOCALE: &str = "notify/locale";
}

// 默认值
const DEFAULT_WAIT_TIME_SECS: u64 = 300;
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
const DEFAULT_STAGING_TIMEOUT_SECS: u64 = 1_800;
const DEFAULT_ADMIN_NAME: &str = "Support";
const DEFAULT_BASE_URL: &str = "http://localhost";

// ==========================================
// PipelineSettings - 管道运行参数
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    /// 冲突时的重入队延迟
    pub wait_time: Duration,
    /// 升级通知阈值（attempts 超过该值时通知）
    pub max_attempts: u32,
    /// worker 空闲轮询间隔
    pub poll_interval: Duration,
    /// 暂存阶段的墙钟上限
    pub staging_timeout: Duration,
    /// 异步路径在暂存失败后是否继续进入校验（待产品确认，默认关闭）
    pub continue_queued_after_staging_failure: bool,
    pub admin_email: String,
    pub admin_name: String,
    /// 重新处理链接的站点前缀
    pub base_url: String,
    /// 校验失败 CSV 报表输出目录
    pub report_dir: PathBuf,
    /// 消息与通知语言（None 表示保持进程当前语言）
    pub locale: Option<String>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            wait_time: Duration::from_secs(DEFAULT_WAIT_TIME_SECS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            staging_timeout: Duration::from_secs(DEFAULT_STAGING_TIMEOUT_SECS),
            continue_queued_after_staging_failure: false,
            admin_email: String::new(),
            admin_name: DEFAULT_ADMIN_NAME.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            report_dir: default_report_dir(),
            locale: None,
        }
    }
}

fn default_report_dir() -> PathBuf {
    std::env::temp_dir().join("file-import-reports")
}

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> ConfigResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        crate::db::init_pipeline_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> ConfigResult<Self> {
        {
            let conn_guard = conn
                .lock()
                .map_err(|e| ConfigError::LockError(e.to_string()))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    pub fn get_global_config_value(&self, key: &str) -> ConfigResult<Option<String>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| ConfigError::LockError(e.to_string()))?;

        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;

        Ok(value)
    }

    /// 写入 global scope 配置值（存在则覆盖）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> ConfigResult<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| ConfigError::LockError(e.to_string()))?;

        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value, updated_at)
             VALUES ('global', ?1, ?2, datetime('now'))
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;

        tracing::info!(key = %key, value = %value, "管道配置已更新");
        Ok(())
    }

    /// 加载管道运行参数（缺省项取默认值）
    pub fn load_pipeline_settings(&self) -> ConfigResult<PipelineSettings> {
        let defaults = PipelineSettings::default();

        let wait_secs =
            self.get_parsed(config_keys::WAIT_TIME_SECS, DEFAULT_WAIT_TIME_SECS)?;
        let max_attempts = self.get_parsed(config_keys::MAX_ATTEMPTS, DEFAULT_MAX_ATTEMPTS)?;
        let poll_ms = self.get_parsed(config_keys::POLL_INTERVAL_MS, DEFAULT_POLL_INTERVAL_MS)?;
        let staging_secs =
            self.get_parsed(config_keys::STAGING_TIMEOUT_SECS, DEFAULT_STAGING_TIMEOUT_SECS)?;
        let continue_after = self.get_bool(
            config_keys::CONTINUE_QUEUED_AFTER_STAGING_FAILURE,
            defaults.continue_queued_after_staging_failure,
        )?;

        let admin_email = self
            .get_global_config_value(config_keys::ADMIN_EMAIL)?
            .unwrap_or(defaults.admin_email);
        let admin_name = self
            .get_global_config_value(config_keys::ADMIN_NAME)?
            .unwrap_or(defaults.admin_name);
        let base_url = self
            .get_global_config_value(config_keys::BASE_URL)?
            .map(|s| s.trim_end_matches('/').to_string())
            .unwrap_or(defaults.base_url);
        let report_dir = self
            .get_global_config_value(config_keys::REPORT_DIR)?
            .map(PathBuf::from)
            .unwrap_or(defaults.report_dir);
        let locale = self
            .get_global_config_value(config_keys::LOCALE)?
            .filter(|s| !s.trim().is_empty());

        Ok(PipelineSettings {
            wait_time: Duration::from_secs(wait_secs),
            max_attempts,
            poll_interval: Duration::from_millis(poll_ms),
            staging_timeout: Duration::from_secs(staging_secs),
            continue_queued_after_staging_failure: continue_after,
            admin_email,
            admin_name,
            base_url,
            report_dir,
            locale,
        })
    }

    fn get_parsed<T>(&self, key: &str, default: T) -> ConfigResult<T>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get_global_config_value(key)? {
            Some(raw) => raw.trim().parse::<T>().map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw.clone(),
                message: e.to_string(),
            }),
            None => Ok(default),
        }
    }

    fn get_bool(&self, key: &str, default: bool) -> ConfigResult<bool> {
        match self.get_global_config_value(key)? {
            Some(raw) => match raw.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: raw,
                    message: "期望布尔值".to_string(),
                }),
            },
            None => Ok(default),
        }
    }
}
