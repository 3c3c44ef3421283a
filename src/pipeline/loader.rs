// ==========================================
// 文件导入管道 - 落库能力接口
// ==========================================
// 职责: 每个数据集一个落库实现，校验全部通过后把暂存数据提交到正式表
// 说明: 启动时按数据集名注册，运行期不按字符串解析可调用对象
// ==========================================

use crate::domain::outcome::TableStatus;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

// ==========================================
// DatasetLoader Trait
// ==========================================
#[async_trait]
pub trait DatasetLoader: Send + Sync {
    /// 提交暂存数据，返回每张子表的处理状态
    async fn commit(&self) -> anyhow::Result<Vec<TableStatus>>;
}

// ==========================================
// LoaderRegistry - 数据集 -> 落库实现
// ==========================================
#[derive(Default, Clone)]
pub struct LoaderRegistry {
    loaders: HashMap<String, Arc<dyn DatasetLoader>>,
}

impl LoaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册落库实现（同名覆盖）
    pub fn register(&mut self, data_set: &str, loader: Arc<dyn DatasetLoader>) {
        self.loaders.insert(data_set.to_string(), loader);
    }

    /// 链式注册
    pub fn with(mut self, data_set: &str, loader: Arc<dyn DatasetLoader>) -> Self {
        self.register(data_set, loader);
        self
    }

    pub fn get(&self, data_set: &str) -> Option<Arc<dyn DatasetLoader>> {
        self.loaders.get(data_set).cloned()
    }

    pub fn contains(&self, data_set: &str) -> bool {
        self.loaders.contains_key(data_set)
    }
}
