// ==========================================
// 文件导入管道 - 应用状态
// ==========================================
// 职责: 打开数据库、读取运行参数、组装仓储/引擎/编排器/调度器/入口 API
// 说明: 数据集配置、通知模板、落库实现由宿主在启动时提供
// ==========================================

use crate::api::{ApiError, ApiResult, ImportApi};
use crate::comparison::engine::{ComparisonEngine, CustomComparison};
use crate::config::config_manager::{ConfigManager, PipelineSettings};
use crate::config::dataset_config::DatasetRegistry;
use crate::db::{init_pipeline_schema, open_sqlite_connection};
use crate::i18n::apply_locale;
use crate::importer::staging_loader::StagingLoader;
use crate::notify::failure_processor::FailureProcessor;
use crate::notify::notifier::Notifier;
use crate::notify::template::TemplateRegistry;
use crate::pipeline::loader::{DatasetLoader, LoaderRegistry};
use crate::pipeline::orchestrator::ImportOrchestrator;
use crate::pipeline::scheduler::ConflictScheduler;
use crate::pipeline::tracker::JobTracker;
use crate::pipeline::worker::ImportWorker;
use crate::repository::import_queue_repo::ImportQueueRepository;
use crate::repository::job_log_repo::JobLogRepository;
use crate::repository::staging_repo::{SqliteStagingRepository, StagingRepository};
use rusqlite::Connection;
use std::sync::{Arc, Mutex};

/// 宿主提供的组装材料
pub struct PipelineParts {
    pub datasets: DatasetRegistry,
    pub templates: TemplateRegistry,
    pub notifier: Arc<dyn Notifier>,
    pub loaders: LoaderRegistry,
    custom_comparisons: Vec<(String, String, Arc<dyn CustomComparison>)>,
}

impl PipelineParts {
    pub fn new(
        datasets: DatasetRegistry,
        templates: TemplateRegistry,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            datasets,
            templates,
            notifier,
            loaders: LoaderRegistry::new(),
            custom_comparisons: Vec::new(),
        }
    }

    /// 注册数据集的落库实现
    pub fn with_loader(mut self, data_set: &str, loader: Arc<dyn DatasetLoader>) -> Self {
        self.loaders.register(data_set, loader);
        self
    }

    /// 注册自定义比对
    pub fn with_custom_comparison(
        mut self,
        data_set: &str,
        comparison: &str,
        check: Arc<dyn CustomComparison>,
    ) -> Self {
        self.custom_comparisons
            .push((data_set.to_string(), comparison.to_string(), check));
        self
    }
}

/// 应用状态
pub struct PipelineState {
    pub conn: Arc<Mutex<Connection>>,
    pub settings: PipelineSettings,
    pub config_manager: Arc<ConfigManager>,
    pub datasets: Arc<DatasetRegistry>,
    pub job_log: Arc<JobLogRepository>,
    pub queue: Arc<ImportQueueRepository>,
    pub notifications: Arc<FailureProcessor>,
    pub orchestrator: Arc<ImportOrchestrator>,
    pub scheduler: Arc<ConflictScheduler>,
    pub import_api: Arc<ImportApi>,
}

impl PipelineState {
    /// 按数据库路径创建
    pub fn new(db_path: &str, parts: PipelineParts) -> ApiResult<Self> {
        tracing::info!(db_path = %db_path, "初始化导入管道");
        let conn = open_sqlite_connection(db_path)
            .map_err(|e| ApiError::DatabaseConnectionError(format!("无法打开数据库: {}", e)))?;
        Self::from_connection(Arc::new(Mutex::new(conn)), parts)
    }

    /// 使用已有连接创建（连接须已配置 PRAGMA）
    pub fn from_connection(conn: Arc<Mutex<Connection>>, parts: PipelineParts) -> ApiResult<Self> {
        {
            let guard = conn
                .lock()
                .map_err(|e| ApiError::DatabaseConnectionError(format!("锁获取失败: {}", e)))?;
            init_pipeline_schema(&guard).map_err(|e| ApiError::DatabaseError(e.to_string()))?;
        }

        // ==========================================
        // 配置
        // ==========================================
        let config_manager = Arc::new(ConfigManager::from_connection(conn.clone())?);
        let settings = config_manager.load_pipeline_settings()?;
        if let Some(locale) = settings.locale.as_deref() {
            apply_locale(locale);
        }
        let datasets = Arc::new(parts.datasets);

        // ==========================================
        // Repository 层
        // ==========================================
        let job_log = Arc::new(JobLogRepository::new(conn.clone()));
        let queue = Arc::new(ImportQueueRepository::new(conn.clone()));
        let staging_repo: Arc<dyn StagingRepository> =
            Arc::new(SqliteStagingRepository::new(conn.clone()));
        let tracker: Arc<dyn JobTracker> = job_log.clone();

        // ==========================================
        // 引擎与编排
        // ==========================================
        let mut engine = ComparisonEngine::new(staging_repo.clone(), datasets.clone());
        for (data_set, comparison, check) in parts.custom_comparisons {
            engine.register_custom(&data_set, &comparison, check);
        }

        let notifications = Arc::new(FailureProcessor::new(
            parts.notifier,
            Arc::new(parts.templates),
            &settings,
        ));

        let orchestrator = Arc::new(ImportOrchestrator::new(
            datasets.clone(),
            tracker.clone(),
            StagingLoader::new(staging_repo, tracker.clone()),
            Arc::new(engine),
            Arc::new(parts.loaders),
            notifications.clone(),
            &settings,
        ));

        let scheduler = Arc::new(ConflictScheduler::new(
            datasets.clone(),
            tracker,
            queue.clone(),
            orchestrator.clone(),
            notifications.clone(),
            &settings,
        ));

        let import_api = Arc::new(ImportApi::new(
            datasets.clone(),
            scheduler.clone(),
            notifications.clone(),
        ));

        tracing::info!(
            datasets = datasets.names().count(),
            wait_secs = settings.wait_time.as_secs(),
            max_attempts = settings.max_attempts,
            "导入管道初始化完成"
        );

        Ok(Self {
            conn,
            settings,
            config_manager,
            datasets,
            job_log,
            queue,
            notifications,
            orchestrator,
            scheduler,
            import_api,
        })
    }

    /// 创建队列 worker（轮询间隔取自运行参数）
    pub fn worker(&self) -> ImportWorker {
        ImportWorker::new(self.scheduler.clone(), self.settings.poll_interval)
    }
}
