// ==========================================
// 文件导入管道 - 作业日志 Repository
// ==========================================
// 职责: job_log / job_log_detail 的读写
// 说明: 作业记录是“是否有导入在运行”的唯一事实来源，
//       阶段变化必须同步写入，后续冲突检查才能看到最新状态
// ==========================================

use crate::domain::job::{ImportJob, JobDetail, JobState};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::sql_value::now_timestamp;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

// ==========================================
// JobLogRepository
// ==========================================
pub struct JobLogRepository {
    conn: Arc<Mutex<Connection>>,
}

impl JobLogRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn lock(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn map_job(row: &Row<'_>) -> rusqlite::Result<ImportJob> {
        let state: String = row.get(3)?;
        Ok(ImportJob {
            job_id: row.get(0)?,
            job_type: row.get(1)?,
            description: row.get(2)?,
            state: JobState::from_str(&state),
            reason: row.get(4)?,
            detail: row.get(5)?,
            started_at: row.get(6)?,
            finished_at: row.get(7)?,
            details: Vec::new(),
        })
    }

    /// 创建运行中作业
    ///
    /// # 返回
    /// - Ok(i64): job_id
    pub fn initiate_job(&self, job_type: &str, description: &str) -> RepositoryResult<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO job_log (job_type, description, state, started_at) VALUES (?1, ?2, 'RUNNING', ?3)",
            params![job_type, description, now_timestamp()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// 追加作业明细
    pub fn add_detail(&self, job_id: i64, label: &str, value: &str) -> RepositoryResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO job_log_detail (job_id, label, value, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![job_id, label, value, now_timestamp()],
        )?;
        Ok(())
    }

    /// 写入终态（先到先得）
    ///
    /// # 返回
    /// - Ok(true): 本次写入生效
    /// - Ok(false): 作业已处于终态，本次忽略
    pub fn finish_job(
        &self,
        job_id: i64,
        state: JobState,
        reason: &str,
        detail: Option<&str>,
    ) -> RepositoryResult<bool> {
        if !state.is_terminal() {
            return Err(RepositoryError::InvalidStateTransition {
                from: JobState::Running.to_string(),
                to: state.to_string(),
            });
        }

        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE job_log SET state = ?1, reason = ?2, detail = ?3, finished_at = ?4
             WHERE job_id = ?5 AND state = 'RUNNING'",
            params![state.as_str(), reason, detail, now_timestamp(), job_id],
        )?;

        if updated == 0 {
            let exists: Option<i64> = conn
                .query_row("SELECT job_id FROM job_log WHERE job_id = ?1", [job_id], |r| {
                    r.get(0)
                })
                .optional()?;
            if exists.is_none() {
                return Err(RepositoryError::NotFound {
                    entity: "ImportJob".to_string(),
                    id: job_id.to_string(),
                });
            }
        }

        Ok(updated > 0)
    }

    /// 查询类型在给定集合内且处于运行中的作业
    pub fn find_running(&self, job_types: &[String]) -> RepositoryResult<Vec<ImportJob>> {
        if job_types.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.lock()?;
        let placeholders = vec!["?"; job_types.len()].join(", ");
        let sql = format!(
            "SELECT job_id, job_type, description, state, reason, detail, started_at, finished_at
             FROM job_log
             WHERE state = 'RUNNING' AND job_type IN ({})
             ORDER BY job_id",
            placeholders
        );
        let mut stmt = conn.prepare(&sql)?;
        let jobs = stmt
            .query_map(params_from_iter(job_types.iter()), Self::map_job)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(jobs)
    }

    /// 读取作业（含明细）
    pub fn get_job(&self, job_id: i64) -> RepositoryResult<ImportJob> {
        let conn = self.lock()?;
        let mut job = conn
            .query_row(
                "SELECT job_id, job_type, description, state, reason, detail, started_at, finished_at
                 FROM job_log WHERE job_id = ?1",
                [job_id],
                Self::map_job,
            )
            .optional()?
            .ok_or_else(|| RepositoryError::NotFound {
                entity: "ImportJob".to_string(),
                id: job_id.to_string(),
            })?;

        let mut stmt = conn.prepare(
            "SELECT label, value, created_at FROM job_log_detail WHERE job_id = ?1 ORDER BY detail_id",
        )?;
        job.details = stmt
            .query_map([job_id], |row| {
                Ok(JobDetail {
                    label: row.get(0)?,
                    value: row.get(1)?,
                    created_at: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(job)
    }

    /// 按类型列出作业（最新在前）
    pub fn list_by_type(&self, job_type: &str) -> RepositoryResult<Vec<ImportJob>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT job_id, job_type, description, state, reason, detail, started_at, finished_at
             FROM job_log WHERE job_type = ?1 ORDER BY job_id DESC",
        )?;
        let jobs = stmt
            .query_map([job_type], Self::map_job)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> JobLogRepository {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_pipeline_schema(&conn).unwrap();
        JobLogRepository::new(Arc::new(Mutex::new(conn)))
    }

    #[test]
    fn test_lifecycle_and_details() {
        let repo = repo();
        let id = repo.initiate_job("Upload - staging_orders", "Uploading a.csv").unwrap();
        repo.add_detail(id, "Record count", "3").unwrap();
        repo.add_detail(id, "Insert count", "3").unwrap();

        assert_eq!(
            repo.find_running(&["Upload - staging_orders".to_string()]).unwrap().len(),
            1
        );

        assert!(repo.finish_job(id, JobState::Succeeded, "done", None).unwrap());
        let job = repo.get_job(id).unwrap();
        assert_eq!(job.state, JobState::Succeeded);
        assert_eq!(job.details.len(), 2);
        assert_eq!(job.details[0].label, "Record count");
        assert!(job.finished_at.is_some());

        assert!(repo
            .find_running(&["Upload - staging_orders".to_string()])
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_terminal_transition_is_first_wins() {
        let repo = repo();
        let id = repo.initiate_job("Upload - t", "x").unwrap();
        assert!(repo.finish_job(id, JobState::Failed, "staging", Some("bad")).unwrap());
        assert!(!repo.finish_job(id, JobState::Succeeded, "late", None).unwrap());

        let job = repo.get_job(id).unwrap();
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.reason.as_deref(), Some("staging"));
    }

    #[test]
    fn test_finish_rejects_running_and_unknown() {
        let repo = repo();
        let id = repo.initiate_job("Upload - t", "x").unwrap();
        assert!(matches!(
            repo.finish_job(id, JobState::Running, "r", None),
            Err(RepositoryError::InvalidStateTransition { .. })
        ));
        assert!(matches!(
            repo.finish_job(999, JobState::Failed, "r", None),
            Err(RepositoryError::NotFound { .. })
        ));
    }

    #[test]
    fn test_find_running_filters_by_type() {
        let repo = repo();
        repo.initiate_job("Upload - a", "x").unwrap();
        repo.initiate_job("Upload - b", "x").unwrap();
        let running = repo.find_running(&["Upload - b".to_string()]).unwrap();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].job_type, "Upload - b");
        assert!(repo.find_running(&[]).unwrap().is_empty());
        assert_eq!(repo.list_by_type("Upload - a").unwrap().len(), 1);
    }
}
