//! Stuck-job reaper.
//!
//! A bridge that crashes or loses connectivity after claiming jobs leaves them
//! in `processing`. The reaper runs at the start of every poll for the polling
//! account and requeues such jobs with a short cool-down. It never touches
//! `retry_count`: an abandoned attempt is not a failed one.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use fiscalbridge_core::{AccountId, JobId};

use crate::jobs::{FiscalJobStore, JobStoreError};

#[derive(Clone)]
pub struct Reaper {
    jobs: Arc<dyn FiscalJobStore>,
    timeout: Duration,
    cooldown: Duration,
}

impl Reaper {
    pub fn new(jobs: Arc<dyn FiscalJobStore>, timeout: Duration, cooldown: Duration) -> Self {
        Self {
            jobs,
            timeout,
            cooldown,
        }
    }

    pub async fn reap(
        &self,
        account_id: AccountId,
        now: DateTime<Utc>,
    ) -> Result<Vec<JobId>, JobStoreError> {
        let reaped = self
            .jobs
            .reap_stuck(account_id, now, self.timeout, self.cooldown)
            .await?;

        for job_id in &reaped {
            tracing::warn!(
                account_id = %account_id,
                job_id = %job_id,
                timeout_secs = self.timeout.as_secs(),
                "requeued stuck fiscal job"
            );
        }
        Ok(reaped)
    }
}
