// ==========================================
// 文件导入管道 - 队列 worker
// ==========================================
// 职责: 轮询指定队列，逐条领取到期任务交给调度器处理
// 说明: 重入队的任务在 available_at 之前不会被领取，worker 本身不 sleep 等它
// ==========================================

use crate::pipeline::error::PipelineResult;
use crate::pipeline::scheduler::{AttemptResult, ConflictScheduler};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info};

pub struct ImportWorker {
    scheduler: Arc<ConflictScheduler>,
    poll_interval: Duration,
}

impl ImportWorker {
    pub fn new(scheduler: Arc<ConflictScheduler>, poll_interval: Duration) -> Self {
        Self {
            scheduler,
            poll_interval,
        }
    }

    /// 处理队列中所有已到期的任务，队列空闲即返回
    pub async fn run_until_idle(&self, queue_name: &str) -> PipelineResult<Vec<AttemptResult>> {
        let mut results = Vec::new();
        while let Some(task) = self.scheduler.queue().claim_due(queue_name)? {
            results.push(self.scheduler.handle_queued(task).await);
        }
        debug!(queue = %queue_name, handled = results.len(), "队列已空闲");
        Ok(results)
    }

    /// 持续处理队列，直到 shutdown 变为 true
    pub async fn run(&self, queue_name: &str, mut shutdown: watch::Receiver<bool>) {
        info!(queue = %queue_name, "导入 worker 启动");

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.scheduler.queue().claim_due(queue_name) {
                Ok(Some(task)) => {
                    self.scheduler.handle_queued(task).await;
                    continue;
                }
                Ok(None) => {}
                Err(e) => error!(queue = %queue_name, error = %e, "领取队列任务失败"),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!(queue = %queue_name, "导入 worker 退出");
    }
}
