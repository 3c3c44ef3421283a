// ==========================================
// 冲突感知调度器集成测试
// ==========================================
// 测试目标:
// - 交互路径: 冲突时返回跳转，不创建作业
// - 异步路径: 冲突时重入队，超限后恰好一次升级通知并移出队列
// - 执行边界: panic 被捕获，队列条目与作业均标记失败
// ==========================================

mod test_helpers;

use async_trait::async_trait;
use file_import_pipeline::config::config_keys;
use file_import_pipeline::domain::{job_type_label, JobState, OutcomeKind, QueueStatus, TableStatus};
use file_import_pipeline::logging;
use file_import_pipeline::notify::TemplateId;
use file_import_pipeline::pipeline::{
    Admission, AttemptAction, DatasetLoader, InteractiveResponse,
};
use file_import_pipeline::CallerOrigin;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use test_helpers::{build_pipeline, fixture_upload, ScriptedLoader, TestPipeline};
use tokio::sync::watch;

const ORDERS_QUEUE: &str = "file_import";

fn orders_pipeline(extra_config: &[(&str, &str)]) -> (TestPipeline, Arc<ScriptedLoader>) {
    let loader = ScriptedLoader::returning(vec![TableStatus::succeeded("orders")]);
    let p = build_pipeline(
        vec![("orders", loader.clone() as Arc<dyn DatasetLoader>)],
        extra_config,
    )
    .expect("组装管道失败");
    (p, loader)
}

/// 模拟一个正在运行的冲突导入
fn start_blocking_job(p: &TestPipeline, staging_table: &str) -> i64 {
    p.state
        .job_log
        .initiate_job(&job_type_label(staging_table), "blocking import")
        .expect("创建阻塞作业失败")
}

// ==========================================
// 准入判定
// ==========================================

#[tokio::test]
async fn test_may_run_now_reports_blocking_jobs() -> Result<(), Box<dyn Error>> {
    logging::init_test();
    let (p, _) = orders_pipeline(&[]);
    let conflict_set = p.state.datasets.get("orders")?.conflict_set();

    assert_eq!(p.state.scheduler.may_run_now(&conflict_set).await?, Admission::Allowed);

    let blocker = start_blocking_job(&p, "staging_lots");
    let admission = p.state.scheduler.may_run_now(&conflict_set).await?;
    assert!(!admission.is_allowed());
    assert_eq!(admission.blocking_jobs(), &[blocker]);

    p.state
        .job_log
        .finish_job(blocker, JobState::Succeeded, "done", None)?;
    assert!(p.state.scheduler.may_run_now(&conflict_set).await?.is_allowed());
    Ok(())
}

// ==========================================
// 交互路径
// ==========================================

#[tokio::test]
async fn test_interactive_conflict_redirects_without_creating_job() -> Result<(), Box<dyn Error>> {
    logging::init_test();
    let (p, loader) = orders_pipeline(&[]);
    let blocker = start_blocking_job(&p, "staging_lots");

    let response = p
        .state
        .scheduler
        .run_interactive("orders", fixture_upload("orders_valid.csv"), CallerOrigin::Browser)
        .await?;

    match response {
        InteractiveResponse::Redirect {
            url,
            job_ids,
            wait_secs,
        } => {
            assert_eq!(job_ids, vec![blocker]);
            assert_eq!(wait_secs, 0);
            assert_eq!(
                url,
                format!("file-transfer/orders-upload?wait_time=0&job_ids[]={}", blocker)
            );
        }
        other => panic!("应返回跳转: {:?}", other),
    }

    assert_eq!(loader.calls(), 0);
    let jobs = p.state.job_log.list_by_type(&job_type_label("staging_orders"))?;
    assert!(jobs.is_empty(), "冲突时不应创建作业");
    assert!(p.notifier.emails().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_interactive_same_dataset_conflicts_with_itself() -> Result<(), Box<dyn Error>> {
    logging::init_test();
    let (p, _) = orders_pipeline(&[]);
    let blocker = start_blocking_job(&p, "staging_orders");

    let response = p
        .state
        .scheduler
        .run_interactive("orders", fixture_upload("orders_valid.csv"), CallerOrigin::Api)
        .await?;

    match response {
        InteractiveResponse::Redirect { job_ids, .. } => assert_eq!(job_ids, vec![blocker]),
        other => panic!("应返回跳转: {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn test_interactive_without_conflict_runs_inline() -> Result<(), Box<dyn Error>> {
    logging::init_test();
    let (p, loader) = orders_pipeline(&[]);
    // 不在冲突集内的作业不阻塞
    start_blocking_job(&p, "staging_unrelated");

    let response = p
        .state
        .scheduler
        .run_interactive("orders", fixture_upload("orders_valid.csv"), CallerOrigin::Browser)
        .await?;

    match response {
        InteractiveResponse::Outcome(outcome) => {
            assert_eq!(outcome.kind, OutcomeKind::LoadSucceeded)
        }
        other => panic!("应内联执行: {:?}", other),
    }
    assert_eq!(loader.calls(), 1);
    Ok(())
}

// ==========================================
// 异步路径
// ==========================================

#[tokio::test]
async fn test_queued_conflict_is_released_with_delay() -> Result<(), Box<dyn Error>> {
    logging::init_test();
    let (p, loader) = orders_pipeline(&[(config_keys::WAIT_TIME_SECS, "120")]);
    let blocker = start_blocking_job(&p, "staging_lots");

    let task_id = p
        .state
        .scheduler
        .enqueue("orders", fixture_upload("orders_valid.csv"))?;
    let task = p
        .state
        .queue
        .claim_due(ORDERS_QUEUE)?
        .expect("应能领取到期任务");
    assert_eq!(task.attempts, 1);

    let result = p.state.scheduler.handle_queued(task).await;
    assert_eq!(result.task_id, task_id);
    assert!(!result.escalated);
    assert_eq!(
        result.action,
        AttemptAction::Released {
            blocking: vec![blocker],
            next_attempt: 2,
        }
    );
    assert_eq!(loader.calls(), 0);

    let entry = p.state.queue.get(&task_id)?;
    assert_eq!(entry.status, QueueStatus::Pending);
    assert_eq!(entry.attempts, 2);
    // 延迟未到，不可再次领取
    assert!(p.state.queue.claim_due(ORDERS_QUEUE)?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_escalation_fires_exactly_once_then_removed() -> Result<(), Box<dyn Error>> {
    logging::init_test();
    let (p, loader) = orders_pipeline(&[]);
    let blocker = start_blocking_job(&p, "staging_lots");

    let task_id = p
        .state
        .scheduler
        .enqueue("orders", fixture_upload("orders_valid.csv"))?;

    // wait_time = 0: 重入队后立即可领取
    let results = p.state.worker().run_until_idle(ORDERS_QUEUE).await?;

    let attempts: Vec<u32> = results.iter().map(|r| r.attempts).collect();
    assert_eq!(attempts, vec![1, 2, 3, 4]);
    let escalations = results.iter().filter(|r| r.escalated).count();
    assert_eq!(escalations, 1);
    assert!(results[3].escalated);
    assert_eq!(
        results[3].action,
        AttemptAction::Removed {
            blocking: vec![blocker]
        }
    );

    assert_eq!(loader.calls(), 0);
    let entry = p.state.queue.get(&task_id)?;
    assert_eq!(entry.status, QueueStatus::Failed);

    // 升级通知: 发给管理员，抄送数据集订阅人，短信通知短信订阅人
    assert_eq!(p.notifier.templates_sent(), vec![TemplateId::dataset("orders")]);
    let email = &p.notifier.emails()[0];
    assert_eq!(email.to.email, "admin@example.com");
    assert_eq!(email.cc.len(), 2);
    assert!(email.body.contains(&blocker.to_string()));
    assert!(email.body.contains("orders_valid.csv"));
    assert_eq!(p.notifier.sms_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_released_task_runs_once_conflict_clears() -> Result<(), Box<dyn Error>> {
    logging::init_test();
    let (p, loader) = orders_pipeline(&[]);
    let blocker = start_blocking_job(&p, "staging_lots");

    let task_id = p
        .state
        .scheduler
        .enqueue("orders", fixture_upload("orders_valid.csv"))?;
    let task = p.state.queue.claim_due(ORDERS_QUEUE)?.expect("应能领取");
    let first = p.state.scheduler.handle_queued(task).await;
    assert!(matches!(first.action, AttemptAction::Released { .. }));

    p.state
        .job_log
        .finish_job(blocker, JobState::Succeeded, "done", None)?;

    let results = p.state.worker().run_until_idle(ORDERS_QUEUE).await?;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].attempts, 2);
    match &results[0].action {
        AttemptAction::Ran(outcome) => {
            assert_eq!(outcome.kind, OutcomeKind::LoadSucceeded);
            assert!(outcome.view.is_none());
        }
        other => panic!("应执行导入: {:?}", other),
    }
    assert_eq!(loader.calls(), 1);
    assert_eq!(p.state.queue.get(&task_id)?.status, QueueStatus::Completed);
    Ok(())
}

#[tokio::test]
async fn test_escalation_without_conflict_still_runs() -> Result<(), Box<dyn Error>> {
    logging::init_test();
    let (p, loader) = orders_pipeline(&[(config_keys::MAX_ATTEMPTS, "0")]);

    p.state
        .scheduler
        .enqueue("orders", fixture_upload("orders_valid.csv"))?;
    let results = p.state.worker().run_until_idle(ORDERS_QUEUE).await?;

    assert_eq!(results.len(), 1);
    assert!(results[0].escalated);
    assert!(matches!(results[0].action, AttemptAction::Ran(_)));
    assert_eq!(loader.calls(), 1);
    // 升级通知 + 成功通知
    assert_eq!(
        p.notifier.templates_sent(),
        vec![TemplateId::dataset("orders"), TemplateId::dataset("orders")]
    );
    Ok(())
}

// ==========================================
// 执行边界
// ==========================================

struct PanickingLoader;

#[async_trait]
impl DatasetLoader for PanickingLoader {
    async fn commit(&self) -> anyhow::Result<Vec<TableStatus>> {
        panic!("loader exploded");
    }
}

#[tokio::test]
async fn test_panic_in_import_is_contained() -> Result<(), Box<dyn Error>> {
    logging::init_test();
    let p = build_pipeline(vec![("orders", Arc::new(PanickingLoader) as Arc<dyn DatasetLoader>)], &[])?;

    let task_id = p
        .state
        .scheduler
        .enqueue("orders", fixture_upload("orders_valid.csv"))?;
    let results = p.state.worker().run_until_idle(ORDERS_QUEUE).await?;

    assert_eq!(results.len(), 1);
    match &results[0].action {
        AttemptAction::Crashed(message) => assert!(message.contains("loader exploded")),
        other => panic!("应捕获 panic: {:?}", other),
    }
    let entry = p.state.queue.get(&task_id)?;
    assert_eq!(entry.status, QueueStatus::Failed);
    assert!(entry
        .error_message
        .as_deref()
        .map_or(false, |m| m.contains("loader exploded")));

    // 作业已写失败终态，不再占用冲突集
    let job_type = job_type_label("staging_orders");
    assert!(p.state.job_log.find_running(&[job_type.clone()])?.is_empty());
    let jobs = p.state.job_log.list_by_type(&job_type)?;
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].state, JobState::Failed);
    assert!(jobs[0]
        .reason
        .as_deref()
        .map_or(false, |r| r.contains("loader exploded")));

    let conflict_set = p.state.datasets.get("orders")?.conflict_set();
    assert!(p.state.scheduler.may_run_now(&conflict_set).await?.is_allowed());
    Ok(())
}

#[tokio::test]
async fn test_worker_processes_queue_until_shutdown() -> Result<(), Box<dyn Error>> {
    logging::init_test();
    let (p, loader) = orders_pipeline(&[]);
    let worker = p.state.worker();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let task_id = p
        .state
        .scheduler
        .enqueue("orders", fixture_upload("orders_valid.csv"))?;

    let driver = async {
        for _ in 0..200 {
            let done = p
                .state
                .queue
                .get(&task_id)
                .map(|entry| entry.status == QueueStatus::Completed)
                .unwrap_or(false);
            if done {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        shutdown_tx.send(true).expect("发送停止信号失败");
    };

    tokio::time::timeout(
        Duration::from_secs(10),
        async { tokio::join!(worker.run(ORDERS_QUEUE, shutdown_rx), driver) },
    )
    .await
    .expect("worker 应在收到停止信号后退出");

    assert_eq!(loader.calls(), 1);
    assert_eq!(p.state.queue.get(&task_id)?.status, QueueStatus::Completed);
    Ok(())
}
