//! Store-facing job types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use fiscalbridge_core::DomainResult;
use fiscalbridge_fiscal::{
    FailureKind, FailureOutcome, FiscalPrinterJob, FiscalResult, JobStatus, RetryPolicy,
};

/// A bridge-reported state change, applied to one job under the store's lock.
#[derive(Debug, Clone)]
pub enum JobTransition {
    Complete {
        result: FiscalResult,
        response: Option<serde_json::Value>,
    },
    CompleteShift {
        response: Option<serde_json::Value>,
    },
    Fail {
        error: String,
        response: Option<serde_json::Value>,
        kind: FailureKind,
        policy: RetryPolicy,
    },
}

impl JobTransition {
    /// Run the domain transition. On error the job must be left unchanged by the
    /// caller (stores apply it to a copy).
    pub fn apply(
        self,
        job: &mut FiscalPrinterJob,
        now: DateTime<Utc>,
    ) -> DomainResult<Option<FailureOutcome>> {
        match self {
            JobTransition::Complete { result, response } => {
                job.complete(result, response, now)?;
                Ok(None)
            }
            JobTransition::CompleteShift { response } => {
                job.complete_shift_operation(response, now)?;
                Ok(None)
            }
            JobTransition::Fail {
                error,
                response,
                kind,
                policy,
            } => job.fail(&error, response, kind, &policy, now).map(Some),
        }
    }
}

/// Job after a transition, plus the failure decision when it was a `Fail`.
#[derive(Debug, Clone)]
pub struct AppliedTransition {
    pub job: FiscalPrinterJob,
    pub failure: Option<FailureOutcome>,
}

/// Per-status job counts for one account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobStats {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

impl JobStats {
    pub fn record(&mut self, status: JobStatus, count: usize) {
        match status {
            JobStatus::Pending => self.pending += count,
            JobStatus::Processing => self.processing += count,
            JobStatus::Completed => self.completed += count,
            JobStatus::Failed => self.failed += count,
        }
    }

    pub fn total(&self) -> usize {
        self.pending + self.processing + self.completed + self.failed
    }
}
