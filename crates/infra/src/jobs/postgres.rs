//! Postgres-backed fiscal job store.
//!
//! ## Atomicity
//!
//! - Claiming is one `UPDATE ... WHERE id IN (SELECT ... FOR UPDATE SKIP LOCKED)`
//!   statement: concurrent pollers of the same account skip each other's rows
//!   instead of blocking, and no row can be claimed twice.
//! - Reaping is a single conditional `UPDATE`; a second run finds nothing to do.
//! - Completion/failure run the domain transition on a row locked with
//!   `SELECT ... FOR UPDATE` inside a transaction.
//!
//! Every statement carries `account_id` in its `WHERE` clause.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use fiscalbridge_core::{AccountId, JobId, ReturnId, SaleId};
use fiscalbridge_fiscal::{FiscalPrinterJob, JobStatus, OperationType, ProviderId};

use super::store::{FiscalJobStore, JobStoreError};
use super::types::{AppliedTransition, JobStats, JobTransition};

const JOB_COLUMNS: &str = r#"
    id, account_id, sale_id, return_id, operation_type, provider,
    request_data, response_data, status, picked_up_at, retry_count,
    next_retry_at, error_message, reaped_at, fiscal_number, fiscal_document_id,
    created_at, updated_at, completed_at
"#;

#[derive(Debug, Clone)]
pub struct PostgresFiscalJobStore {
    pool: Arc<PgPool>,
}

impl PostgresFiscalJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    async fn lock_job(
        tx: &mut Transaction<'_, Postgres>,
        account_id: AccountId,
        job_id: JobId,
    ) -> Result<Option<FiscalPrinterJob>, JobStoreError> {
        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM fiscal_printer_jobs WHERE id = $1 AND account_id = $2 FOR UPDATE"
        ))
        .bind(job_id.as_uuid())
        .bind(account_id.as_uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("lock_job", e))?;

        row.as_ref().map(job_from_row).transpose()
    }

    async fn write_state(
        tx: &mut Transaction<'_, Postgres>,
        job: &FiscalPrinterJob,
    ) -> Result<(), JobStoreError> {
        sqlx::query(
            r#"
            UPDATE fiscal_printer_jobs SET
                status = $3,
                picked_up_at = $4,
                retry_count = $5,
                next_retry_at = $6,
                error_message = $7,
                fiscal_number = $8,
                fiscal_document_id = $9,
                response_data = $10,
                updated_at = $11,
                completed_at = $12,
                reaped_at = $13
            WHERE id = $1 AND account_id = $2
            "#,
        )
        .bind(job.id.as_uuid())
        .bind(job.account_id.as_uuid())
        .bind(job.status.as_str())
        .bind(job.picked_up_at)
        .bind(retry_count_to_db(job.retry_count))
        .bind(job.next_retry_at)
        .bind(job.error_message.as_deref())
        .bind(job.fiscal_number.as_deref())
        .bind(job.fiscal_document_id.as_deref())
        .bind(job.response_data.as_ref())
        .bind(job.updated_at)
        .bind(job.completed_at)
        .bind(job.reaped_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("write_state", e))?;
        Ok(())
    }
}

#[async_trait]
impl FiscalJobStore for PostgresFiscalJobStore {
    #[instrument(skip(self, job), fields(account_id = %job.account_id, job_id = %job.id), err)]
    async fn insert(&self, job: FiscalPrinterJob) -> Result<FiscalPrinterJob, JobStoreError> {
        sqlx::query(
            r#"
            INSERT INTO fiscal_printer_jobs (
                id, account_id, sale_id, return_id, operation_type, provider,
                request_data, response_data, status, picked_up_at, retry_count,
                next_retry_at, error_message, reaped_at, fiscal_number, fiscal_document_id,
                created_at, updated_at, completed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
            "#,
        )
        .bind(job.id.as_uuid())
        .bind(job.account_id.as_uuid())
        .bind(job.sale_id.map(Uuid::from))
        .bind(job.return_id.map(Uuid::from))
        .bind(job.operation_type.as_str())
        .bind(job.provider.as_str())
        .bind(&job.request_data)
        .bind(job.response_data.as_ref())
        .bind(job.status.as_str())
        .bind(job.picked_up_at)
        .bind(retry_count_to_db(job.retry_count))
        .bind(job.next_retry_at)
        .bind(job.error_message.as_deref())
        .bind(job.reaped_at)
        .bind(job.fiscal_number.as_deref())
        .bind(job.fiscal_document_id.as_deref())
        .bind(job.created_at)
        .bind(job.updated_at)
        .bind(job.completed_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| match map_sqlx_error("insert", e) {
            JobStoreError::AlreadyExists(_) => JobStoreError::AlreadyExists(job.id),
            other => other,
        })?;

        Ok(job)
    }

    #[instrument(skip(self), fields(account_id = %account_id, job_id = %job_id), err)]
    async fn get(
        &self,
        account_id: AccountId,
        job_id: JobId,
    ) -> Result<Option<FiscalPrinterJob>, JobStoreError> {
        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM fiscal_printer_jobs WHERE id = $1 AND account_id = $2"
        ))
        .bind(job_id.as_uuid())
        .bind(account_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get", e))?;

        row.as_ref().map(job_from_row).transpose()
    }

    #[instrument(skip(self), fields(account_id = %account_id), err)]
    async fn list(
        &self,
        account_id: AccountId,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<FiscalPrinterJob>, JobStoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {JOB_COLUMNS} FROM fiscal_printer_jobs
            WHERE account_id = $1 AND ($2::text IS NULL OR status = $2)
            ORDER BY created_at DESC, id DESC
            LIMIT $3
            "#
        ))
        .bind(account_id.as_uuid())
        .bind(status.map(|s| s.as_str()))
        .bind(limit_to_db(limit))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list", e))?;

        rows.iter().map(job_from_row).collect()
    }

    #[instrument(skip(self), fields(account_id = %account_id), err)]
    async fn stats(&self, account_id: AccountId) -> Result<JobStats, JobStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT status, COUNT(*) AS count
            FROM fiscal_printer_jobs
            WHERE account_id = $1
            GROUP BY status
            "#,
        )
        .bind(account_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("stats", e))?;

        let mut stats = JobStats::default();
        for row in rows {
            let status: String = row.try_get("status").map_err(row_error)?;
            let count: i64 = row.try_get("count").map_err(row_error)?;
            let status = JobStatus::parse(&status)
                .ok_or_else(|| JobStoreError::Storage(format!("unknown job status {status:?}")))?;
            stats.record(status, usize::try_from(count).unwrap_or(0));
        }
        Ok(stats)
    }

    #[instrument(skip(self), fields(account_id = %account_id), err)]
    async fn reap_stuck(
        &self,
        account_id: AccountId,
        now: DateTime<Utc>,
        timeout: Duration,
        cooldown: Duration,
    ) -> Result<Vec<JobId>, JobStoreError> {
        let picked_before = now - to_chrono(timeout)?;
        let retry_at = now + to_chrono(cooldown)?;

        let rows = sqlx::query(
            r#"
            UPDATE fiscal_printer_jobs SET
                status = 'pending',
                picked_up_at = NULL,
                next_retry_at = $3,
                reaped_at = $2,
                updated_at = $2
            WHERE account_id = $1
              AND status = 'processing'
              AND picked_up_at < $4
            RETURNING id
            "#,
        )
        .bind(account_id.as_uuid())
        .bind(now)
        .bind(retry_at)
        .bind(picked_before)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("reap_stuck", e))?;

        let mut ids = rows
            .iter()
            .map(|row| row.try_get::<Uuid, _>("id").map(JobId::from).map_err(row_error))
            .collect::<Result<Vec<_>, _>>()?;
        ids.sort();
        Ok(ids)
    }

    #[instrument(skip(self), fields(account_id = %account_id), err)]
    async fn claim_batch(
        &self,
        account_id: AccountId,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<FiscalPrinterJob>, JobStoreError> {
        let rows = sqlx::query(&format!(
            r#"
            UPDATE fiscal_printer_jobs SET
                status = 'processing',
                picked_up_at = $2,
                reaped_at = NULL,
                updated_at = $2
            WHERE id IN (
                SELECT id FROM fiscal_printer_jobs
                WHERE account_id = $1
                  AND status = 'pending'
                  AND (next_retry_at IS NULL OR next_retry_at <= $2)
                ORDER BY created_at ASC, id ASC
                LIMIT $3
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(account_id.as_uuid())
        .bind(now)
        .bind(limit_to_db(limit))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("claim_batch", e))?;

        // RETURNING does not preserve the subquery order.
        let mut jobs = rows.iter().map(job_from_row).collect::<Result<Vec<_>, _>>()?;
        jobs.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        Ok(jobs)
    }

    #[instrument(skip(self, transition), fields(account_id = %account_id, job_id = %job_id), err)]
    async fn apply(
        &self,
        account_id: AccountId,
        job_id: JobId,
        transition: JobTransition,
        now: DateTime<Utc>,
    ) -> Result<AppliedTransition, JobStoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;

        let mut job = Self::lock_job(&mut tx, account_id, job_id)
            .await?
            .ok_or(JobStoreError::NotFound(job_id))?;

        // On a domain error the transaction is dropped and rolled back.
        let failure = transition.apply(&mut job, now)?;
        Self::write_state(&mut tx, &job).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit", e))?;

        Ok(AppliedTransition { job, failure })
    }
}

fn job_from_row(row: &PgRow) -> Result<FiscalPrinterJob, JobStoreError> {
    let operation_type: String = row.try_get("operation_type").map_err(row_error)?;
    let status: String = row.try_get("status").map_err(row_error)?;
    let provider: String = row.try_get("provider").map_err(row_error)?;
    let retry_count: i32 = row.try_get("retry_count").map_err(row_error)?;

    Ok(FiscalPrinterJob {
        id: JobId::from(row.try_get::<Uuid, _>("id").map_err(row_error)?),
        account_id: AccountId::from(row.try_get::<Uuid, _>("account_id").map_err(row_error)?),
        sale_id: row
            .try_get::<Option<Uuid>, _>("sale_id")
            .map_err(row_error)?
            .map(SaleId::from),
        return_id: row
            .try_get::<Option<Uuid>, _>("return_id")
            .map_err(row_error)?
            .map(ReturnId::from),
        operation_type: OperationType::parse(&operation_type).ok_or_else(|| {
            JobStoreError::Storage(format!("unknown operation type {operation_type:?}"))
        })?,
        provider: ProviderId::new(provider),
        request_data: row.try_get("request_data").map_err(row_error)?,
        response_data: row.try_get("response_data").map_err(row_error)?,
        status: JobStatus::parse(&status)
            .ok_or_else(|| JobStoreError::Storage(format!("unknown job status {status:?}")))?,
        picked_up_at: row.try_get("picked_up_at").map_err(row_error)?,
        retry_count: u32::try_from(retry_count).unwrap_or(0),
        next_retry_at: row.try_get("next_retry_at").map_err(row_error)?,
        error_message: row.try_get("error_message").map_err(row_error)?,
        reaped_at: row.try_get("reaped_at").map_err(row_error)?,
        fiscal_number: row.try_get("fiscal_number").map_err(row_error)?,
        fiscal_document_id: row.try_get("fiscal_document_id").map_err(row_error)?,
        created_at: row.try_get("created_at").map_err(row_error)?,
        updated_at: row.try_get("updated_at").map_err(row_error)?,
        completed_at: row.try_get("completed_at").map_err(row_error)?,
    })
}

fn retry_count_to_db(count: u32) -> i32 {
    i32::try_from(count).unwrap_or(i32::MAX)
}

fn limit_to_db(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn to_chrono(d: Duration) -> Result<chrono::Duration, JobStoreError> {
    chrono::Duration::from_std(d)
        .map_err(|e| JobStoreError::Storage(format!("duration out of range: {e}")))
}

fn row_error(err: sqlx::Error) -> JobStoreError {
    JobStoreError::Storage(format!("failed to decode job row: {err}"))
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> JobStoreError {
    match err {
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505") => {
            // The id is filled in by the caller.
            JobStoreError::AlreadyExists(JobId::from(Uuid::nil()))
        }
        sqlx::Error::Database(db_err) => {
            JobStoreError::Storage(format!("database error in {operation}: {}", db_err.message()))
        }
        sqlx::Error::PoolClosed => {
            JobStoreError::Storage(format!("connection pool closed in {operation}"))
        }
        other => JobStoreError::Storage(format!("{operation} failed: {other}")),
    }
}
