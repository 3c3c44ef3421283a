// ==========================================
// 文件导入管道 - 暂存表 Repository
// ==========================================
// 职责: 暂存表结构读取、清空、逐行写入、比对规则所需查询
// 红线: Repository 不含业务规则，只做数据访问
// ==========================================
// 说明: 暂存表与参照表由宿主建表，约定暂存表有自增主键 id
// ==========================================

use crate::domain::comparison::Normalization;
use crate::domain::types::StagedRow;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::sql_value::{quote_ident, row_to_staged, to_sql_value};
use async_trait::async_trait;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

/// 暂存表主键列
pub const ID_COLUMN: &str = "id";

// IN (...) 列表单批上限，低于 SQLite 默认变量上限
const ID_CHUNK_SIZE: usize = 500;

// ==========================================
// StagingRepository Trait
// ==========================================
// 实现者: SqliteStagingRepository
#[async_trait]
pub trait StagingRepository: Send + Sync {
    /// 读取目标表列名（不含 id）
    async fn table_columns(&self, table: &str) -> RepositoryResult<Vec<String>>;

    /// 清空表（同时重置自增序列）
    async fn truncate(&self, table: &str) -> RepositoryResult<()>;

    /// 写入一行（空行不写入）
    async fn insert_row(&self, table: &str, row: &StagedRow) -> RepositoryResult<()>;

    /// 表内行数
    async fn count_rows(&self, table: &str) -> RepositoryResult<usize>;

    /// 指定列为 null 的行 id
    async fn null_ids(&self, table: &str, column: &str) -> RepositoryResult<Vec<i64>>;

    /// 指定列的值在参照表中找不到的行 id（一次反连接）
    ///
    /// # 参数
    /// - nullable: true 时 null 值视为通过
    async fn unmatched_reference_ids(
        &self,
        table: &str,
        column: &str,
        reference_table: &str,
        reference_key: &str,
        nullable: bool,
    ) -> RepositoryResult<Vec<i64>>;

    /// 读取 (id, 值) 列表
    async fn column_values(
        &self,
        table: &str,
        column: &str,
    ) -> RepositoryResult<Vec<(i64, serde_json::Value)>>;

    /// 按 id 批量回查整行（可选投影，id 始终包含）
    async fn fetch_rows(
        &self,
        table: &str,
        ids: &[i64],
        projection: &[String],
    ) -> RepositoryResult<Vec<StagedRow>>;

    /// 回写规范化值（单事务）
    async fn apply_normalizations(
        &self,
        table: &str,
        normalizations: &[Normalization],
    ) -> RepositoryResult<usize>;

    /// 在参照表中按键查找一条记录
    async fn find_reference(
        &self,
        table: &str,
        key: &str,
        value: &serde_json::Value,
    ) -> RepositoryResult<Option<StagedRow>>;
}

// ==========================================
// SqliteStagingRepository
// ==========================================
pub struct SqliteStagingRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStagingRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn lock(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// PRAGMA table_info 读取全部列名（含 id）
    fn all_columns(conn: &Connection, table: &str) -> RepositoryResult<Vec<String>> {
        let sql = format!("PRAGMA table_info({})", quote_ident(table)?);
        let mut stmt = conn.prepare(&sql)?;
        let columns = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<Vec<_>, _>>()?;

        if columns.is_empty() {
            return Err(RepositoryError::TableNotFound(table.to_string()));
        }
        Ok(columns)
    }

    /// 校验列存在（SQLite 会把不存在的双引号标识符当作字符串字面量）
    fn require_columns(conn: &Connection, table: &str, columns: &[&str]) -> RepositoryResult<()> {
        let existing = Self::all_columns(conn, table)?;
        for column in columns {
            if !existing.iter().any(|c| c == column) {
                return Err(RepositoryError::ColumnNotFound {
                    table: table.to_string(),
                    column: column.to_string(),
                });
            }
        }
        Ok(())
    }

    fn query_ids(conn: &Connection, sql: &str) -> RepositoryResult<Vec<i64>> {
        let mut stmt = conn.prepare(sql)?;
        let ids = stmt
            .query_map([], |row| row.get::<_, i64>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }
}

#[async_trait]
impl StagingRepository for SqliteStagingRepository {
    async fn table_columns(&self, table: &str) -> RepositoryResult<Vec<String>> {
        let conn = self.lock()?;
        let columns = Self::all_columns(&conn, table)?
            .into_iter()
            .filter(|c| c != ID_COLUMN)
            .collect();
        Ok(columns)
    }

    async fn truncate(&self, table: &str) -> RepositoryResult<()> {
        let conn = self.lock()?;
        let quoted = quote_ident(table)?;
        conn.execute(&format!("DELETE FROM {}", quoted), [])?;

        let has_sequence: bool = conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type='table' AND name='sqlite_sequence'",
                [],
                |_row| Ok(true),
            )
            .optional()?
            .unwrap_or(false);
        if has_sequence {
            conn.execute("DELETE FROM sqlite_sequence WHERE name = ?1", [table])?;
        }
        Ok(())
    }

    async fn insert_row(&self, table: &str, row: &StagedRow) -> RepositoryResult<()> {
        let conn = self.lock()?;
        let quoted = quote_ident(table)?;

        if row.is_empty() {
            return Ok(());
        }

        let columns = row
            .keys()
            .map(|k| quote_ident(k))
            .collect::<RepositoryResult<Vec<_>>>()?;
        let placeholders = (1..=row.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quoted,
            columns.join(", "),
            placeholders
        );

        conn.execute(&sql, params_from_iter(row.values().map(to_sql_value)))?;
        Ok(())
    }

    async fn count_rows(&self, table: &str) -> RepositoryResult<usize> {
        let conn = self.lock()?;
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table)?);
        let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count.max(0) as usize)
    }

    async fn null_ids(&self, table: &str, column: &str) -> RepositoryResult<Vec<i64>> {
        let conn = self.lock()?;
        Self::require_columns(&conn, table, &[ID_COLUMN, column])?;

        let sql = format!(
            "SELECT {id} FROM {t} WHERE {c} IS NULL ORDER BY {id}",
            id = quote_ident(ID_COLUMN)?,
            t = quote_ident(table)?,
            c = quote_ident(column)?,
        );
        Self::query_ids(&conn, &sql)
    }

    async fn unmatched_reference_ids(
        &self,
        table: &str,
        column: &str,
        reference_table: &str,
        reference_key: &str,
        nullable: bool,
    ) -> RepositoryResult<Vec<i64>> {
        let conn = self.lock()?;
        Self::require_columns(&conn, table, &[ID_COLUMN, column])?;
        Self::require_columns(&conn, reference_table, &[reference_key])?;

        let c = quote_ident(column)?;
        let null_clause = if nullable {
            format!("s.{} IS NOT NULL AND ", c)
        } else {
            String::new()
        };
        let sql = format!(
            "SELECT s.{id} FROM {t} s \
             WHERE {null_clause}NOT EXISTS (SELECT 1 FROM {r} ref WHERE ref.{k} = s.{c}) \
             ORDER BY s.{id}",
            id = quote_ident(ID_COLUMN)?,
            t = quote_ident(table)?,
            r = quote_ident(reference_table)?,
            k = quote_ident(reference_key)?,
            c = c,
            null_clause = null_clause,
        );
        Self::query_ids(&conn, &sql)
    }

    async fn column_values(
        &self,
        table: &str,
        column: &str,
    ) -> RepositoryResult<Vec<(i64, serde_json::Value)>> {
        let conn = self.lock()?;
        Self::require_columns(&conn, table, &[ID_COLUMN, column])?;

        let sql = format!(
            "SELECT {id}, {c} FROM {t} ORDER BY {id}",
            id = quote_ident(ID_COLUMN)?,
            t = quote_ident(table)?,
            c = quote_ident(column)?,
        );
        let mut stmt = conn.prepare(&sql)?;
        let values = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    crate::repository::sql_value::from_sql_value(row.get_ref(1)?),
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(values)
    }

    async fn fetch_rows(
        &self,
        table: &str,
        ids: &[i64],
        projection: &[String],
    ) -> RepositoryResult<Vec<StagedRow>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.lock()?;
        let columns: Vec<String> = if projection.is_empty() {
            Self::all_columns(&conn, table)?
        } else {
            let mut cols = vec![ID_COLUMN.to_string()];
            cols.extend(projection.iter().filter(|c| c.as_str() != ID_COLUMN).cloned());
            let refs: Vec<&str> = cols.iter().map(|c| c.as_str()).collect();
            Self::require_columns(&conn, table, &refs)?;
            cols
        };

        let select_list = columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<RepositoryResult<Vec<_>>>()?
            .join(", ");
        let id_col = quote_ident(ID_COLUMN)?;
        let quoted_table = quote_ident(table)?;

        let mut rows = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(ID_CHUNK_SIZE) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                "SELECT {} FROM {} WHERE {} IN ({}) ORDER BY {}",
                select_list, quoted_table, id_col, placeholders, id_col
            );
            let mut stmt = conn.prepare(&sql)?;
            let fetched = stmt
                .query_map(params_from_iter(chunk.iter()), |row| row_to_staged(row, &columns))?
                .collect::<Result<Vec<_>, _>>()?;
            rows.extend(fetched);
        }
        Ok(rows)
    }

    async fn apply_normalizations(
        &self,
        table: &str,
        normalizations: &[Normalization],
    ) -> RepositoryResult<usize> {
        if normalizations.is_empty() {
            return Ok(0);
        }

        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        let quoted_table = quote_ident(table)?;
        let id_col = quote_ident(ID_COLUMN)?;
        let mut updated = 0;
        for n in normalizations {
            let sql = format!(
                "UPDATE {} SET {} = ?1 WHERE {} = ?2",
                quoted_table,
                quote_ident(&n.column)?,
                id_col
            );
            updated += tx.execute(
                &sql,
                rusqlite::params![to_sql_value(&n.value), n.id],
            )?;
        }

        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        Ok(updated)
    }

    async fn find_reference(
        &self,
        table: &str,
        key: &str,
        value: &serde_json::Value,
    ) -> RepositoryResult<Option<StagedRow>> {
        let conn = self.lock()?;
        Self::require_columns(&conn, table, &[key])?;
        let columns = Self::all_columns(&conn, table)?;

        let sql = format!(
            "SELECT * FROM {} WHERE {} = ?1 LIMIT 1",
            quote_ident(table)?,
            quote_ident(key)?
        );
        let row = conn
            .query_row(&sql, [to_sql_value(value)], |row| row_to_staged(row, &columns))
            .optional()?;
        Ok(row)
    }
}
