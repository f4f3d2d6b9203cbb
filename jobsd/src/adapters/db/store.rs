// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::collections::BTreeMap;
use std::{path::Path, str::FromStr, time::Duration};

use sqlx::{
    Row, Sqlite, SqliteConnection, SqlitePool,
    pool::PoolConnection,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
};
use thiserror::Error;

use crate::app::types::{
    AppSpec, ExecSystem, Job, JobBlocked, JobParameters, JobRecovery, JobStatus, NewJob,
    NewJobBlocked, NewJobRecovery, NewSystem, SchedulerType,
};

#[derive(Debug, Error)]
pub enum JobStoreError {
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("empty {0}")]
    Empty(&'static str),
    #[error("job not found: {0}")]
    JobNotFound(String),
    #[error("recovery record not found: {0}")]
    RecoveryNotFound(i64),
    #[error("corrupt column {column}: {detail}")]
    Corrupt { column: &'static str, detail: String },
}

pub type Result<T> = std::result::Result<T, JobStoreError>;

const NOW: &str = "strftime('%Y-%m-%dT%H:%M:%fZ','now')";

/// Write transaction that takes the database write lock at `BEGIN`.
///
/// A deferred transaction that reads first fails with `SQLITE_BUSY_SNAPSHOT` when
/// another connection commits before its first write, and `busy_timeout` does not
/// apply to that upgrade. `BEGIN IMMEDIATE` waits on the busy handler instead.
/// Dropped without [`ImmediateTx::commit`], the connection is closed so SQLite
/// rolls the transaction back.
struct ImmediateTx {
    conn: PoolConnection<Sqlite>,
    open: bool,
}

impl ImmediateTx {
    async fn begin(pool: &SqlitePool) -> Result<Self> {
        let mut conn = pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;
        Ok(Self { conn, open: true })
    }

    fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.conn
    }

    async fn commit(mut self) -> Result<()> {
        sqlx::query("COMMIT").execute(&mut *self.conn).await?;
        self.open = false;
        Ok(())
    }
}

impl Drop for ImmediateTx {
    fn drop(&mut self) {
        if self.open {
            self.conn.close_on_drop();
        }
    }
}

/// Async store for execution systems, jobs and recovery records.
#[derive(Clone)]
pub struct JobStore {
    pool: SqlitePool,
}

impl JobStore {
    /// Open (or create) a file-backed SQLite DB.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let url = format!("sqlite://{}", path.as_ref().to_string_lossy());
        let opts = SqliteConnectOptions::from_str(&url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await?;
        let store = Self { pool };
        store.bootstrap().await?;
        Ok(store)
    }

    /// Open an in-memory store (handy for tests).
    pub async fn open_memory() -> Result<Self> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;
        let store = Self { pool };
        store.bootstrap().await?;
        Ok(store)
    }

    async fn bootstrap(&self) -> Result<()> {
        // Improve concurrency for file DBs.
        let _ = sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await;

        self.ensure_systems_table().await?;
        self.ensure_jobs_table().await?;
        self.ensure_recovery_tables().await?;
        Ok(())
    }

    async fn ensure_systems_table(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS systems (
              tenant TEXT NOT NULL,
              id TEXT NOT NULL,
              host TEXT NOT NULL,
              port INTEGER NOT NULL DEFAULT 22,
              effective_user TEXT NOT NULL,
              identity_path TEXT,
              enabled INTEGER NOT NULL DEFAULT 1,
              scheduler TEXT,
              max_jobs_per_user INTEGER,
              created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
              updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
              PRIMARY KEY (tenant, id)
            );
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn ensure_jobs_table(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              tenant TEXT NOT NULL,
              uuid TEXT NOT NULL UNIQUE,
              name TEXT NOT NULL,
              owner TEXT NOT NULL,
              status TEXT NOT NULL DEFAULT 'PENDING',
              job_type TEXT NOT NULL,
              max_minutes INTEGER NOT NULL DEFAULT 0,
              exec_system_id TEXT NOT NULL,
              exec_dir TEXT NOT NULL,
              input_dir TEXT NOT NULL,
              output_dir TEXT NOT NULL,
              app_json TEXT NOT NULL,
              parameters_json TEXT NOT NULL,
              remote_job_id TEXT,
              remote_checks_success INTEGER NOT NULL DEFAULT 0,
              remote_checks_failed INTEGER NOT NULL DEFAULT 0,
              last_message TEXT,
              cancel_requested INTEGER NOT NULL DEFAULT 0,
              created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
              updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now'))
            );
            CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);
            CREATE INDEX IF NOT EXISTS idx_jobs_quota ON jobs(tenant, exec_system_id, owner, status);
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn ensure_recovery_tables(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS job_recovery (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              tenant TEXT NOT NULL,
              condition_code TEXT NOT NULL,
              tester_type TEXT NOT NULL,
              tester_params TEXT NOT NULL,
              policy_type TEXT NOT NULL,
              policy_params TEXT NOT NULL,
              tester_hash TEXT NOT NULL,
              num_attempts INTEGER NOT NULL DEFAULT 0,
              created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
              last_updated TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now'))
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_job_recovery_hash
              ON job_recovery(tenant, tester_hash);

            CREATE TABLE IF NOT EXISTS job_blocked (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              recovery_id INTEGER NOT NULL REFERENCES job_recovery(id) ON DELETE CASCADE,
              job_uuid TEXT NOT NULL UNIQUE,
              success_status TEXT NOT NULL,
              status_message TEXT NOT NULL,
              created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now'))
            );
            CREATE INDEX IF NOT EXISTS idx_job_blocked_recovery ON job_blocked(recovery_id);
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn upsert_system(&self, system: &NewSystem) -> Result<()> {
        if system.id.trim().is_empty() {
            return Err(JobStoreError::Empty("system id"));
        }
        if system.host.trim().is_empty() {
            return Err(JobStoreError::Empty("system host"));
        }
        sqlx::query(&format!(
            r#"
            INSERT INTO systems(
              tenant, id, host, port, effective_user, identity_path, enabled,
              scheduler, max_jobs_per_user
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(tenant, id) DO UPDATE SET
              host = excluded.host,
              port = excluded.port,
              effective_user = excluded.effective_user,
              identity_path = excluded.identity_path,
              enabled = excluded.enabled,
              scheduler = excluded.scheduler,
              max_jobs_per_user = excluded.max_jobs_per_user,
              updated_at = {NOW}
            "#
        ))
        .bind(&system.tenant)
        .bind(&system.id)
        .bind(&system.host)
        .bind(i64::from(system.port))
        .bind(&system.effective_user)
        .bind(&system.identity_path)
        .bind(system.enabled)
        .bind(system.scheduler.map(|s| s.as_str()))
        .bind(system.max_jobs_per_user)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_system(&self, tenant: &str, id: &str) -> Result<Option<ExecSystem>> {
        sqlx::query("SELECT * FROM systems WHERE tenant = ?1 AND id = ?2")
            .bind(tenant)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(row_to_system)
            .transpose()
    }

    pub async fn insert_job(&self, job: &NewJob) -> Result<i64> {
        if job.uuid.trim().is_empty() {
            return Err(JobStoreError::Empty("job uuid"));
        }
        let rec = sqlx::query(
            r#"
            INSERT INTO jobs(
              tenant, uuid, name, owner, job_type, max_minutes, exec_system_id,
              exec_dir, input_dir, output_dir, app_json, parameters_json
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            RETURNING id
            "#,
        )
        .bind(&job.tenant)
        .bind(&job.uuid)
        .bind(&job.name)
        .bind(&job.owner)
        .bind(job.job_type.as_str())
        .bind(job.max_minutes)
        .bind(&job.exec_system_id)
        .bind(&job.exec_dir)
        .bind(&job.input_dir)
        .bind(&job.output_dir)
        .bind(serde_json::to_string(&job.app)?)
        .bind(serde_json::to_string(&job.parameters)?)
        .fetch_one(&self.pool)
        .await?;
        Ok(rec.try_get::<i64, _>("id")?)
    }

    pub async fn get_job(&self, uuid: &str) -> Result<Option<Job>> {
        sqlx::query("SELECT * FROM jobs WHERE uuid = ?1")
            .bind(uuid)
            .fetch_optional(&self.pool)
            .await?
            .map(row_to_job)
            .transpose()
    }

    pub async fn list_jobs_by_status(&self, statuses: &[JobStatus]) -> Result<Vec<Job>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; statuses.len()].join(", ");
        let sql = format!("SELECT * FROM jobs WHERE status IN ({placeholders}) ORDER BY id");
        let mut query = sqlx::query(&sql);
        for status in statuses {
            query = query.bind(status.as_str());
        }
        query
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(row_to_job)
            .collect()
    }

    pub async fn set_remote_job_id(&self, uuid: &str, remote_job_id: &str) -> Result<()> {
        let done = sqlx::query(&format!(
            "UPDATE jobs SET remote_job_id = ?2, updated_at = {NOW} WHERE uuid = ?1"
        ))
        .bind(uuid)
        .bind(remote_job_id)
        .execute(&self.pool)
        .await?;
        ensure_job_touched(done.rows_affected(), uuid)
    }

    /// Set the status; a `None` message keeps the previous one.
    pub async fn update_status(
        &self,
        uuid: &str,
        status: JobStatus,
        message: Option<&str>,
    ) -> Result<()> {
        let done = sqlx::query(&format!(
            r#"
            UPDATE jobs
            SET status = ?2, last_message = COALESCE(?3, last_message), updated_at = {NOW}
            WHERE uuid = ?1
            "#
        ))
        .bind(uuid)
        .bind(status.as_str())
        .bind(message)
        .execute(&self.pool)
        .await?;
        ensure_job_touched(done.rows_affected(), uuid)
    }

    pub async fn record_remote_check(&self, uuid: &str, success: bool) -> Result<()> {
        let column = if success {
            "remote_checks_success"
        } else {
            "remote_checks_failed"
        };
        let done = sqlx::query(&format!(
            "UPDATE jobs SET {column} = {column} + 1, updated_at = {NOW} WHERE uuid = ?1"
        ))
        .bind(uuid)
        .execute(&self.pool)
        .await?;
        ensure_job_touched(done.rows_affected(), uuid)
    }

    /// Flag a non-terminal job for cancellation. False when the job is unknown or finished.
    pub async fn request_cancel(&self, uuid: &str) -> Result<bool> {
        let done = sqlx::query(&format!(
            r#"
            UPDATE jobs SET cancel_requested = 1, updated_at = {NOW}
            WHERE uuid = ?1 AND status NOT IN ('DONE', 'FAILED', 'CANCELLED')
            "#
        ))
        .bind(uuid)
        .execute(&self.pool)
        .await?;
        Ok(done.rows_affected() > 0)
    }

    pub async fn count_active_jobs(
        &self,
        tenant: &str,
        system_id: &str,
        owner: &str,
    ) -> Result<i64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS n FROM jobs
            WHERE tenant = ?1 AND exec_system_id = ?2 AND owner = ?3
              AND status IN ('SUBMITTING_JOB', 'QUEUED', 'RUNNING')
            "#,
        )
        .bind(tenant)
        .bind(system_id)
        .bind(owner)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get::<i64, _>("n")?)
    }

    /// Attach a job to the record with the same tenant and tester hash, creating it if needed.
    /// Returns the record id and whether it was created.
    pub async fn block_job(
        &self,
        recovery: &NewJobRecovery,
        blocked: &NewJobBlocked,
    ) -> Result<(i64, bool)> {
        let mut tx = ImmediateTx::begin(&self.pool).await?;
        let existing =
            sqlx::query("SELECT id FROM job_recovery WHERE tenant = ?1 AND tester_hash = ?2")
                .bind(&recovery.tenant)
                .bind(&recovery.tester_hash)
                .fetch_optional(tx.conn())
                .await?;
        let (recovery_id, created) = match existing {
            Some(row) => (row.try_get::<i64, _>("id")?, false),
            None => {
                let row = sqlx::query(
                    r#"
                    INSERT INTO job_recovery(
                      tenant, condition_code, tester_type, tester_params,
                      policy_type, policy_params, tester_hash
                    )
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                    RETURNING id
                    "#,
                )
                .bind(&recovery.tenant)
                .bind(recovery.condition_code.as_str())
                .bind(recovery.tester_type.as_str())
                .bind(serde_json::to_string(&recovery.tester_params)?)
                .bind(recovery.policy_type.as_str())
                .bind(serde_json::to_string(&recovery.policy_params)?)
                .bind(&recovery.tester_hash)
                .fetch_one(tx.conn())
                .await?;
                (row.try_get::<i64, _>("id")?, true)
            }
        };
        let previous = sqlx::query("SELECT recovery_id FROM job_blocked WHERE job_uuid = ?1")
            .bind(&blocked.job_uuid)
            .fetch_optional(tx.conn())
            .await?
            .map(|row| row.try_get::<i64, _>("recovery_id"))
            .transpose()?;
        sqlx::query(
            r#"
            INSERT INTO job_blocked(recovery_id, job_uuid, success_status, status_message)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(job_uuid) DO UPDATE SET
              recovery_id = excluded.recovery_id,
              success_status = excluded.success_status,
              status_message = excluded.status_message
            "#,
        )
        .bind(recovery_id)
        .bind(&blocked.job_uuid)
        .bind(blocked.success_status.as_str())
        .bind(&blocked.status_message)
        .execute(tx.conn())
        .await?;
        if let Some(previous) = previous.filter(|id| *id != recovery_id) {
            drop_if_empty(tx.conn(), previous).await?;
        }
        tx.commit().await?;
        Ok((recovery_id, created))
    }

    pub async fn get_recovery(&self, id: i64) -> Result<Option<JobRecovery>> {
        let Some(row) = sqlx::query("SELECT * FROM job_recovery WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };
        let mut recovery = row_to_recovery(row)?;
        recovery.blocked = self.list_blocked(id).await?;
        Ok(Some(recovery))
    }

    pub async fn list_recoveries(&self) -> Result<Vec<JobRecovery>> {
        let rows = sqlx::query("SELECT * FROM job_recovery ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let mut recovery = row_to_recovery(row)?;
            recovery.blocked = self.list_blocked(recovery.id).await?;
            out.push(recovery);
        }
        Ok(out)
    }

    async fn list_blocked(&self, recovery_id: i64) -> Result<Vec<JobBlocked>> {
        sqlx::query("SELECT * FROM job_blocked WHERE recovery_id = ?1 ORDER BY id")
            .bind(recovery_id)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(row_to_blocked)
            .collect()
    }

    pub async fn increment_recovery_attempts(&self, id: i64) -> Result<i64> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE job_recovery SET num_attempts = num_attempts + 1, last_updated = {NOW}
            WHERE id = ?1
            RETURNING num_attempts
            "#
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(JobStoreError::RecoveryNotFound(id))?;
        Ok(row.try_get::<i64, _>("num_attempts")?)
    }

    /// Detach one job; the record goes away with its last blocked job.
    pub async fn unblock_job(&self, job_uuid: &str) -> Result<Option<JobBlocked>> {
        let mut tx = ImmediateTx::begin(&self.pool).await?;
        let Some(row) = sqlx::query("SELECT * FROM job_blocked WHERE job_uuid = ?1")
            .bind(job_uuid)
            .fetch_optional(tx.conn())
            .await?
        else {
            tx.commit().await?;
            return Ok(None);
        };
        let blocked = row_to_blocked(row)?;
        sqlx::query("DELETE FROM job_blocked WHERE job_uuid = ?1")
            .bind(job_uuid)
            .execute(tx.conn())
            .await?;
        drop_if_empty(tx.conn(), blocked.recovery_id).await?;
        tx.commit().await?;
        Ok(Some(blocked))
    }

    pub async fn resolve_recovery(&self, id: i64) -> Result<Vec<JobBlocked>> {
        let mut tx = ImmediateTx::begin(&self.pool).await?;
        let blocked = sqlx::query("SELECT * FROM job_blocked WHERE recovery_id = ?1 ORDER BY id")
            .bind(id)
            .fetch_all(tx.conn())
            .await?
            .into_iter()
            .map(row_to_blocked)
            .collect::<Result<Vec<_>>>()?;
        sqlx::query("DELETE FROM job_blocked WHERE recovery_id = ?1")
            .bind(id)
            .execute(tx.conn())
            .await?;
        sqlx::query("DELETE FROM job_recovery WHERE id = ?1")
            .bind(id)
            .execute(tx.conn())
            .await?;
        tx.commit().await?;
        Ok(blocked)
    }
}

async fn drop_if_empty(conn: &mut SqliteConnection, recovery_id: i64) -> Result<()> {
    let remaining = sqlx::query("SELECT COUNT(*) AS n FROM job_blocked WHERE recovery_id = ?1")
        .bind(recovery_id)
        .fetch_one(&mut *conn)
        .await?
        .try_get::<i64, _>("n")?;
    if remaining == 0 {
        sqlx::query("DELETE FROM job_recovery WHERE id = ?1")
            .bind(recovery_id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

fn ensure_job_touched(rows: u64, uuid: &str) -> Result<()> {
    if rows == 0 {
        return Err(JobStoreError::JobNotFound(uuid.to_string()));
    }
    Ok(())
}

fn parse_column<T: FromStr<Err = String>>(row: &SqliteRow, column: &'static str) -> Result<T> {
    let text: String = row.try_get(column)?;
    text.parse::<T>()
        .map_err(|detail| JobStoreError::Corrupt { column, detail })
}

fn json_column<T: serde::de::DeserializeOwned>(row: &SqliteRow, column: &'static str) -> Result<T> {
    let text: String = row.try_get(column)?;
    Ok(serde_json::from_str(&text)?)
}

fn row_to_system(row: SqliteRow) -> Result<ExecSystem> {
    let port: i64 = row.try_get("port")?;
    let scheduler: Option<String> = row.try_get("scheduler")?;
    Ok(ExecSystem {
        tenant: row.try_get("tenant")?,
        id: row.try_get("id")?,
        host: row.try_get("host")?,
        port: u16::try_from(port).map_err(|err| JobStoreError::Corrupt {
            column: "port",
            detail: err.to_string(),
        })?,
        effective_user: row.try_get("effective_user")?,
        identity_path: row.try_get("identity_path")?,
        enabled: row.try_get("enabled")?,
        scheduler: scheduler
            .map(|s| s.parse::<SchedulerType>())
            .transpose()
            .map_err(|detail| JobStoreError::Corrupt {
                column: "scheduler",
                detail,
            })?,
        max_jobs_per_user: row.try_get("max_jobs_per_user")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_job(row: SqliteRow) -> Result<Job> {
    let app: AppSpec = json_column(&row, "app_json")?;
    let parameters: JobParameters = json_column(&row, "parameters_json")?;
    Ok(Job {
        id: row.try_get("id")?,
        tenant: row.try_get("tenant")?,
        uuid: row.try_get("uuid")?,
        name: row.try_get("name")?,
        owner: row.try_get("owner")?,
        status: parse_column(&row, "status")?,
        job_type: parse_column(&row, "job_type")?,
        max_minutes: row.try_get("max_minutes")?,
        exec_system_id: row.try_get("exec_system_id")?,
        exec_dir: row.try_get("exec_dir")?,
        input_dir: row.try_get("input_dir")?,
        output_dir: row.try_get("output_dir")?,
        app,
        parameters,
        remote_job_id: row.try_get("remote_job_id")?,
        remote_checks_success: row.try_get("remote_checks_success")?,
        remote_checks_failed: row.try_get("remote_checks_failed")?,
        last_message: row.try_get("last_message")?,
        cancel_requested: row.try_get("cancel_requested")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_recovery(row: SqliteRow) -> Result<JobRecovery> {
    let tester_params: BTreeMap<String, String> = json_column(&row, "tester_params")?;
    let policy_params: BTreeMap<String, String> = json_column(&row, "policy_params")?;
    Ok(JobRecovery {
        id: row.try_get("id")?,
        tenant: row.try_get("tenant")?,
        condition_code: parse_column(&row, "condition_code")?,
        tester_type: parse_column(&row, "tester_type")?,
        tester_params,
        policy_type: parse_column(&row, "policy_type")?,
        policy_params,
        tester_hash: row.try_get("tester_hash")?,
        num_attempts: row.try_get("num_attempts")?,
        created_at: row.try_get("created_at")?,
        last_updated: row.try_get("last_updated")?,
        blocked: Vec::new(),
    })
}

fn row_to_blocked(row: SqliteRow) -> Result<JobBlocked> {
    Ok(JobBlocked {
        recovery_id: row.try_get("recovery_id")?,
        job_uuid: row.try_get("job_uuid")?,
        success_status: parse_column(&row, "success_status")?,
        status_message: row.try_get("status_message")?,
        created_at: row.try_get("created_at")?,
    })
}
