//! Job storage implementations.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use fiscalbridge_core::{AccountId, DomainError, JobId};
use fiscalbridge_fiscal::{FiscalPrinterJob, JobStatus};

use super::types::{AppliedTransition, JobStats, JobTransition};

/// Fiscal job store abstraction.
///
/// Every read and write is scoped to an account: a job belonging to another
/// account is indistinguishable from a missing one.
#[async_trait]
pub trait FiscalJobStore: Send + Sync {
    /// Persist a new job.
    async fn insert(&self, job: FiscalPrinterJob) -> Result<FiscalPrinterJob, JobStoreError>;

    /// Get a job by ID.
    async fn get(
        &self,
        account_id: AccountId,
        job_id: JobId,
    ) -> Result<Option<FiscalPrinterJob>, JobStoreError>;

    /// Jobs of an account, newest first, optionally filtered by status.
    async fn list(
        &self,
        account_id: AccountId,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<FiscalPrinterJob>, JobStoreError>;

    async fn stats(&self, account_id: AccountId) -> Result<JobStats, JobStoreError>;

    /// Requeue processing jobs picked up more than `timeout` ago.
    ///
    /// Returns the ids of the jobs that were reset by this call.
    async fn reap_stuck(
        &self,
        account_id: AccountId,
        now: DateTime<Utc>,
        timeout: Duration,
        cooldown: Duration,
    ) -> Result<Vec<JobId>, JobStoreError>;

    /// Select up to `limit` eligible pending jobs (oldest first) and mark them
    /// processing in one atomic step.
    async fn claim_batch(
        &self,
        account_id: AccountId,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<FiscalPrinterJob>, JobStoreError>;

    /// Read-modify-write a single job under a lock.
    async fn apply(
        &self,
        account_id: AccountId,
        job_id: JobId,
        transition: JobTransition,
        now: DateTime<Utc>,
    ) -> Result<AppliedTransition, JobStoreError>;
}

/// Job store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("job already exists: {0}")]
    AlreadyExists(JobId),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("storage error: {0}")]
    Storage(String),
}

/// In-memory job store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryFiscalJobStore {
    jobs: RwLock<HashMap<JobId, FiscalPrinterJob>>,
}

impl InMemoryFiscalJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<JobId, FiscalPrinterJob>>, JobStoreError> {
        self.jobs
            .read()
            .map_err(|_| JobStoreError::Storage("job store lock poisoned".into()))
    }

    fn write(
        &self,
    ) -> Result<RwLockWriteGuard<'_, HashMap<JobId, FiscalPrinterJob>>, JobStoreError> {
        self.jobs
            .write()
            .map_err(|_| JobStoreError::Storage("job store lock poisoned".into()))
    }
}

#[async_trait]
impl FiscalJobStore for InMemoryFiscalJobStore {
    async fn insert(&self, job: FiscalPrinterJob) -> Result<FiscalPrinterJob, JobStoreError> {
        let mut jobs = self.write()?;
        if jobs.contains_key(&job.id) {
            return Err(JobStoreError::AlreadyExists(job.id));
        }
        jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn get(
        &self,
        account_id: AccountId,
        job_id: JobId,
    ) -> Result<Option<FiscalPrinterJob>, JobStoreError> {
        let jobs = self.read()?;
        Ok(jobs
            .get(&job_id)
            .filter(|j| j.account_id == account_id)
            .cloned())
    }

    async fn list(
        &self,
        account_id: AccountId,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<FiscalPrinterJob>, JobStoreError> {
        let jobs = self.read()?;
        let mut result: Vec<_> = jobs
            .values()
            .filter(|j| j.account_id == account_id && status.is_none_or(|s| j.status == s))
            .cloned()
            .collect();

        result.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        result.truncate(limit);
        Ok(result)
    }

    async fn stats(&self, account_id: AccountId) -> Result<JobStats, JobStoreError> {
        let jobs = self.read()?;
        let mut stats = JobStats::default();
        for job in jobs.values().filter(|j| j.account_id == account_id) {
            stats.record(job.status, 1);
        }
        Ok(stats)
    }

    async fn reap_stuck(
        &self,
        account_id: AccountId,
        now: DateTime<Utc>,
        timeout: Duration,
        cooldown: Duration,
    ) -> Result<Vec<JobId>, JobStoreError> {
        let mut jobs = self.write()?;
        let mut reaped: Vec<JobId> = jobs
            .values_mut()
            .filter(|j| j.account_id == account_id)
            .filter_map(|j| j.reap(now, timeout, cooldown).then_some(j.id))
            .collect();
        reaped.sort();
        Ok(reaped)
    }

    async fn claim_batch(
        &self,
        account_id: AccountId,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<FiscalPrinterJob>, JobStoreError> {
        let mut jobs = self.write()?;

        // FIFO by creation, ties broken by id
        let mut candidates: Vec<(DateTime<Utc>, JobId)> = jobs
            .values()
            .filter(|j| j.account_id == account_id && j.is_eligible(now))
            .map(|j| (j.created_at, j.id))
            .collect();
        candidates.sort();
        candidates.truncate(limit);

        let mut claimed = Vec::with_capacity(candidates.len());
        for (_, id) in candidates {
            if let Some(job) = jobs.get_mut(&id) {
                job.claim(now)?;
                claimed.push(job.clone());
            }
        }
        Ok(claimed)
    }

    async fn apply(
        &self,
        account_id: AccountId,
        job_id: JobId,
        transition: JobTransition,
        now: DateTime<Utc>,
    ) -> Result<AppliedTransition, JobStoreError> {
        let mut jobs = self.write()?;
        let stored = jobs
            .get_mut(&job_id)
            .filter(|j| j.account_id == account_id)
            .ok_or(JobStoreError::NotFound(job_id))?;

        let mut job = stored.clone();
        let failure = transition.apply(&mut job, now)?;
        *stored = job.clone();

        Ok(AppliedTransition { job, failure })
    }
}
