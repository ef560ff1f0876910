//! Fiscal printer job and its state machine.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fiscalbridge_core::{AccountId, DomainError, DomainResult, JobId, ReturnId, SaleId};

use crate::classify::FailureKind;
use crate::retry::RetryPolicy;

/// Fiscal printer vendor/profile identifier (e.g. `"generic"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(String);

impl ProviderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the bridge is asked to do with the printer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    #[default]
    Sale,
    Return,
    ShiftOpen,
    ShiftClose,
    ShiftStatus,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Sale => "sale",
            OperationType::Return => "return",
            OperationType::ShiftOpen => "shift_open",
            OperationType::ShiftClose => "shift_close",
            OperationType::ShiftStatus => "shift_status",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sale" => Some(OperationType::Sale),
            "return" => Some(OperationType::Return),
            "shift_open" => Some(OperationType::ShiftOpen),
            "shift_close" => Some(OperationType::ShiftClose),
            "shift_status" => Some(OperationType::ShiftStatus),
            _ => None,
        }
    }

    pub fn is_shift_operation(&self) -> bool {
        matches!(
            self,
            OperationType::ShiftOpen | OperationType::ShiftClose | OperationType::ShiftStatus
        )
    }
}

/// Job execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Queued, waiting for a bridge poll (possibly delayed by `next_retry_at`)
    Pending,
    /// Claimed by a bridge, `picked_up_at` is set
    Processing,
    /// Fiscal document printed
    Completed,
    /// Terminal failure (permanent error or retry ceiling reached)
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Request to create a job, as supplied by the sale/return/shift flows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewFiscalJob {
    pub sale_id: Option<SaleId>,
    pub return_id: Option<ReturnId>,
    #[serde(default)]
    pub operation_type: OperationType,
    pub provider: ProviderId,
    /// Provider-formatted instructions; never interpreted here.
    pub request_data: serde_json::Value,
}

impl NewFiscalJob {
    pub fn sale(sale_id: SaleId, provider: ProviderId, request_data: serde_json::Value) -> Self {
        Self {
            sale_id: Some(sale_id),
            return_id: None,
            operation_type: OperationType::Sale,
            provider,
            request_data,
        }
    }

    pub fn refund(return_id: ReturnId, provider: ProviderId, request_data: serde_json::Value) -> Self {
        Self {
            sale_id: None,
            return_id: Some(return_id),
            operation_type: OperationType::Return,
            provider,
            request_data,
        }
    }

    pub fn shift(
        operation_type: OperationType,
        provider: ProviderId,
        request_data: serde_json::Value,
    ) -> Self {
        Self {
            sale_id: None,
            return_id: None,
            operation_type,
            provider,
            request_data,
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.provider.as_str().trim().is_empty() {
            return Err(DomainError::validation("provider must not be empty"));
        }
        if self.operation_type.is_shift_operation()
            && (self.sale_id.is_some() || self.return_id.is_some())
        {
            return Err(DomainError::validation(
                "shift operations cannot reference a sale or return",
            ));
        }
        Ok(())
    }
}

/// Fiscal identifiers reported by the bridge on success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiscalResult {
    pub fiscal_number: String,
    pub fiscal_document_id: Option<String>,
}

/// What the failure path decided, surfaced to the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FailureOutcome {
    pub is_retriable: bool,
    pub can_retry: bool,
    pub retry_count: u32,
    pub next_retry_at: Option<DateTime<Utc>>,
}

/// The unit of fiscal work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FiscalPrinterJob {
    pub id: JobId,
    pub account_id: AccountId,
    pub sale_id: Option<SaleId>,
    pub return_id: Option<ReturnId>,
    pub operation_type: OperationType,
    pub provider: ProviderId,
    pub request_data: serde_json::Value,
    pub response_data: Option<serde_json::Value>,
    pub status: JobStatus,
    pub picked_up_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    /// Set when the reaper requeued the job; cleared on the next claim.
    pub reaped_at: Option<DateTime<Utc>>,
    pub fiscal_number: Option<String>,
    pub fiscal_document_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl FiscalPrinterJob {
    /// Create a pending job.
    pub fn new(account_id: AccountId, request: NewFiscalJob, now: DateTime<Utc>) -> Self {
        Self {
            id: JobId::new(),
            account_id,
            sale_id: request.sale_id,
            return_id: request.return_id,
            operation_type: request.operation_type,
            provider: request.provider,
            request_data: request.request_data,
            response_data: None,
            status: JobStatus::Pending,
            picked_up_at: None,
            retry_count: 0,
            next_retry_at: None,
            error_message: None,
            reaped_at: None,
            fiscal_number: None,
            fiscal_document_id: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Pending and not held back by a retry delay.
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Pending && self.next_retry_at.is_none_or(|at| at <= now)
    }

    /// Processing for longer than `timeout`.
    pub fn is_stuck(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        if self.status != JobStatus::Processing {
            return false;
        }
        match self.picked_up_at {
            Some(picked) => picked + to_chrono(timeout) < now,
            None => false,
        }
    }

    /// Hand the job to a bridge.
    pub fn claim(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        if !self.is_eligible(now) {
            return Err(DomainError::invariant(format!(
                "job {} is not eligible for claiming (status: {})",
                self.id,
                self.status.as_str()
            )));
        }
        self.status = JobStatus::Processing;
        self.picked_up_at = Some(now);
        self.reaped_at = None;
        self.updated_at = now;
        Ok(())
    }

    /// Requeue an abandoned job with a short cool-down.
    ///
    /// Returns `false` (and changes nothing) if the job is not stuck.
    pub fn reap(&mut self, now: DateTime<Utc>, timeout: Duration, cooldown: Duration) -> bool {
        if !self.is_stuck(now, timeout) {
            return false;
        }
        self.status = JobStatus::Pending;
        self.picked_up_at = None;
        self.next_retry_at = Some(now + to_chrono(cooldown));
        self.reaped_at = Some(now);
        self.updated_at = now;
        true
    }

    /// Record a successful fiscal receipt.
    ///
    /// Late completions of a reaped (pending again) job are accepted: the
    /// document was printed, so accepting it prevents a second print.
    pub fn complete(
        &mut self,
        result: FiscalResult,
        response: Option<serde_json::Value>,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        self.ensure_reportable(true)?;
        if result.fiscal_number.trim().is_empty() {
            return Err(DomainError::validation("fiscal_number must not be empty"));
        }
        self.fiscal_number = Some(result.fiscal_number);
        self.fiscal_document_id = result.fiscal_document_id;
        self.finish(response, now);
        Ok(())
    }

    /// Record a successful shift open/close/status operation.
    pub fn complete_shift_operation(
        &mut self,
        response: Option<serde_json::Value>,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        self.ensure_reportable(true)?;
        if !self.operation_type.is_shift_operation() {
            return Err(DomainError::validation(format!(
                "job {} is a {} job, not a shift operation",
                self.id,
                self.operation_type.as_str()
            )));
        }
        self.finish(response, now);
        Ok(())
    }

    /// Record a failure and decide between a scheduled retry and termination.
    ///
    /// Only a job currently held by a bridge can fail; a repeated report for an
    /// attempt that already failed is rejected instead of burning a retry.
    pub fn fail(
        &mut self,
        error: &str,
        response: Option<serde_json::Value>,
        kind: FailureKind,
        policy: &RetryPolicy,
        now: DateTime<Utc>,
    ) -> DomainResult<FailureOutcome> {
        self.ensure_reportable(false)?;

        let is_retriable = kind.is_retriable();
        self.retry_count = self.retry_count.saturating_add(1);
        self.error_message = Some(error.to_string());
        if response.is_some() {
            self.response_data = response;
        }
        self.picked_up_at = None;
        self.reaped_at = None;
        self.updated_at = now;

        let can_retry = is_retriable && policy.should_retry(self.retry_count);
        if can_retry {
            let at = now + to_chrono(policy.delay_for_retry(self.retry_count));
            self.status = JobStatus::Pending;
            self.next_retry_at = Some(at);
        } else {
            self.status = JobStatus::Failed;
            self.next_retry_at = None;
        }

        Ok(FailureOutcome {
            is_retriable,
            can_retry,
            retry_count: self.retry_count,
            next_retry_at: self.next_retry_at,
        })
    }

    /// A report applies to a processing job, or (when `allow_reaped`) to a job
    /// the reaper requeued and nobody has claimed since.
    fn ensure_reportable(&self, allow_reaped: bool) -> DomainResult<()> {
        match self.status {
            JobStatus::Processing => Ok(()),
            JobStatus::Pending if allow_reaped && self.reaped_at.is_some() => Ok(()),
            JobStatus::Pending => Err(DomainError::terminal(format!(
                "job {} is not being processed (status: pending)",
                self.id
            ))),
            JobStatus::Completed | JobStatus::Failed => Err(DomainError::terminal(format!(
                "job {} is already {}",
                self.id,
                self.status.as_str()
            ))),
        }
    }

    fn finish(&mut self, response: Option<serde_json::Value>, now: DateTime<Utc>) {
        if response.is_some() {
            self.response_data = response;
        }
        self.status = JobStatus::Completed;
        self.picked_up_at = None;
        self.next_retry_at = None;
        self.error_message = None;
        self.reaped_at = None;
        self.updated_at = now;
        self.completed_at = Some(now);
    }
}

fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::days(36_500))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::FailureClassifier;
    use proptest::prelude::*;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn sale_job() -> FiscalPrinterJob {
        FiscalPrinterJob::new(
            AccountId::new(),
            NewFiscalJob::sale(
                SaleId::new(),
                ProviderId::new("generic"),
                serde_json::json!({"lines": [{"name": "Coffee", "price": 250}]}),
            ),
            t0(),
        )
    }

    fn fn001() -> FiscalResult {
        FiscalResult {
            fiscal_number: "FN-001".into(),
            fiscal_document_id: Some("DOC-9".into()),
        }
    }

    #[test]
    fn new_job_is_pending_and_eligible() {
        let job = sale_job();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.retry_count, 0);
        assert!(job.picked_up_at.is_none());
        assert!(job.is_eligible(t0()));
    }

    #[test]
    fn claim_sets_picked_up_at() {
        let mut job = sale_job();
        job.claim(t0()).unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.picked_up_at, Some(t0()));

        assert!(job.claim(t0()).is_err());
    }

    #[test]
    fn complete_stores_fiscal_identifiers_and_response() {
        let mut job = sale_job();
        job.claim(t0()).unwrap();
        job.complete(fn001(), Some(serde_json::json!({"raw": "OK"})), t0())
            .unwrap();

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.fiscal_number.as_deref(), Some("FN-001"));
        assert_eq!(job.fiscal_document_id.as_deref(), Some("DOC-9"));
        assert_eq!(job.response_data, Some(serde_json::json!({"raw": "OK"})));
        assert!(job.picked_up_at.is_none());
    }

    #[test]
    fn completing_twice_never_overwrites_fiscal_number() {
        let mut job = sale_job();
        job.claim(t0()).unwrap();
        job.complete(fn001(), None, t0()).unwrap();

        let err = job
            .complete(
                FiscalResult {
                    fiscal_number: "FN-002".into(),
                    fiscal_document_id: None,
                },
                None,
                t0(),
            )
            .unwrap_err();

        assert!(matches!(err, DomainError::Terminal(_)));
        assert_eq!(job.fiscal_number.as_deref(), Some("FN-001"));
    }

    #[test]
    fn blank_fiscal_number_is_rejected() {
        let mut job = sale_job();
        job.claim(t0()).unwrap();
        let err = job
            .complete(
                FiscalResult {
                    fiscal_number: "  ".into(),
                    fiscal_document_id: None,
                },
                None,
                t0(),
            )
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(job.status, JobStatus::Processing);
    }

    #[test]
    fn transient_failure_schedules_retry() {
        let mut job = sale_job();
        job.claim(t0()).unwrap();

        let outcome = job
            .fail("Printer offline", None, FailureKind::Transient, &RetryPolicy::default(), t0())
            .unwrap();

        assert!(outcome.is_retriable);
        assert!(outcome.can_retry);
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.retry_count, 1);
        assert_eq!(job.next_retry_at, Some(t0() + chrono::Duration::seconds(30)));
        assert!(job.picked_up_at.is_none());
        assert!(!job.is_eligible(t0() + chrono::Duration::seconds(29)));
        assert!(job.is_eligible(t0() + chrono::Duration::seconds(30)));
    }

    #[test]
    fn permanent_failure_is_terminal_with_budget_left() {
        let mut job = sale_job();
        job.claim(t0()).unwrap();

        let kind = FailureClassifier::default().classify("Duplicate fiscal document 12345");
        let outcome = job
            .fail("Duplicate fiscal document 12345", None, kind, &RetryPolicy::default(), t0())
            .unwrap();

        assert!(!outcome.is_retriable);
        assert!(!outcome.can_retry);
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.next_retry_at.is_none());
    }

    #[test]
    fn retry_ceiling_terminates() {
        let policy = RetryPolicy::fixed(2, Duration::from_secs(30));
        let mut job = sale_job();
        let mut now = t0();

        job.claim(now).unwrap();
        assert!(job.fail("Paper out", None, FailureKind::Transient, &policy, now).unwrap().can_retry);

        now += chrono::Duration::seconds(31);
        job.claim(now).unwrap();
        let outcome = job.fail("Paper out", None, FailureKind::Transient, &policy, now).unwrap();

        assert!(outcome.is_retriable);
        assert!(!outcome.can_retry);
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.retry_count, 2);
    }

    #[test]
    fn stuck_job_is_reaped_once() {
        let timeout = Duration::from_secs(300);
        let cooldown = Duration::from_secs(30);
        let mut job = sale_job();
        job.claim(t0()).unwrap();

        let later = t0() + chrono::Duration::minutes(6);
        assert!(job.reap(later, timeout, cooldown));
        let after_first = job.clone();

        assert!(!job.reap(later, timeout, cooldown));
        assert_eq!(job, after_first);
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.next_retry_at, Some(later + chrono::Duration::seconds(30)));
        assert_eq!(job.retry_count, 0);
    }

    #[test]
    fn fresh_processing_job_is_not_stuck() {
        let mut job = sale_job();
        job.claim(t0()).unwrap();
        assert!(!job.is_stuck(t0() + chrono::Duration::minutes(5), Duration::from_secs(300)));
        assert!(job.is_stuck(
            t0() + chrono::Duration::minutes(5) + chrono::Duration::seconds(1),
            Duration::from_secs(300)
        ));
    }

    #[test]
    fn late_completion_after_reap_is_accepted() {
        let mut job = sale_job();
        job.claim(t0()).unwrap();
        let later = t0() + chrono::Duration::minutes(6);
        job.reap(later, Duration::from_secs(300), Duration::from_secs(30));

        assert_eq!(job.reaped_at, Some(later));

        job.complete(fn001(), None, later).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.next_retry_at.is_none());
        assert!(job.reaped_at.is_none());
    }

    #[test]
    fn repeated_failure_report_does_not_burn_retries() {
        let policy = RetryPolicy::default();
        let mut job = sale_job();
        job.claim(t0()).unwrap();
        job.fail("Printer offline", None, FailureKind::Transient, &policy, t0())
            .unwrap();
        let after_first = job.clone();

        for _ in 0..2 {
            let err = job
                .fail("Printer offline", None, FailureKind::Transient, &policy, t0())
                .unwrap_err();
            assert!(matches!(err, DomainError::Terminal(_)));
        }
        assert_eq!(job, after_first);
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.retry_count, 1);
    }

    #[test]
    fn unclaimed_job_cannot_be_reported() {
        let mut job = sale_job();
        assert!(matches!(
            job.complete(fn001(), None, t0()),
            Err(DomainError::Terminal(_))
        ));

        // A job waiting out a retry delay was not reaped, so completion is refused too.
        job.claim(t0()).unwrap();
        job.fail("Paper out", None, FailureKind::Transient, &RetryPolicy::default(), t0())
            .unwrap();
        assert!(matches!(
            job.complete(fn001(), None, t0()),
            Err(DomainError::Terminal(_))
        ));
        assert_eq!(job.status, JobStatus::Pending);
    }

    #[test]
    fn reaped_job_cannot_fail_before_it_is_claimed_again() {
        let mut job = sale_job();
        job.claim(t0()).unwrap();
        let later = t0() + chrono::Duration::minutes(6);
        job.reap(later, Duration::from_secs(300), Duration::from_secs(30));

        let err = job
            .fail("Printer offline", None, FailureKind::Transient, &RetryPolicy::default(), later)
            .unwrap_err();
        assert!(matches!(err, DomainError::Terminal(_)));
        assert_eq!(job.retry_count, 0);

        job.claim(later + chrono::Duration::seconds(30)).unwrap();
        assert!(job.reaped_at.is_none());
    }

    #[test]
    fn shift_completion_requires_shift_operation() {
        let mut job = sale_job();
        job.claim(t0()).unwrap();
        assert!(matches!(
            job.complete_shift_operation(None, t0()),
            Err(DomainError::Validation(_))
        ));

        let mut shift = FiscalPrinterJob::new(
            AccountId::new(),
            NewFiscalJob::shift(OperationType::ShiftOpen, ProviderId::new("generic"), serde_json::json!({})),
            t0(),
        );
        shift.claim(t0()).unwrap();
        shift
            .complete_shift_operation(Some(serde_json::json!({"ok": true})), t0())
            .unwrap();
        assert_eq!(shift.status, JobStatus::Completed);
    }

    #[test]
    fn new_job_validation() {
        let ok = NewFiscalJob::sale(SaleId::new(), ProviderId::new("generic"), serde_json::json!({}));
        assert!(ok.validate().is_ok());

        let mut bad = NewFiscalJob::shift(OperationType::ShiftClose, ProviderId::new("generic"), serde_json::json!({}));
        bad.sale_id = Some(SaleId::new());
        assert!(bad.validate().is_err());

        let blank = NewFiscalJob::shift(OperationType::ShiftStatus, ProviderId::new(" "), serde_json::json!({}));
        assert!(blank.validate().is_err());
    }

    #[test]
    fn enums_round_trip_through_str() {
        for op in [
            OperationType::Sale,
            OperationType::Return,
            OperationType::ShiftOpen,
            OperationType::ShiftClose,
            OperationType::ShiftStatus,
        ] {
            assert_eq!(OperationType::parse(op.as_str()), Some(op));
        }
        for status in [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(JobStatus::parse(status.as_str()), Some(status));
        }
    }

    #[derive(Debug, Clone)]
    enum Step {
        Claim,
        FailTransient,
        FailPermanent,
        Complete,
        Advance(i64),
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![
            Just(Step::Claim),
            Just(Step::FailTransient),
            Just(Step::FailPermanent),
            Just(Step::Complete),
            (1i64..900).prop_map(Step::Advance),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: retry_count never decreases, picked_up_at is set iff processing,
        /// and terminal states are never left.
        #[test]
        fn lifecycle_invariants_hold(steps in prop::collection::vec(step(), 1..40)) {
            let policy = RetryPolicy::default();
            let timeout = Duration::from_secs(300);
            let cooldown = Duration::from_secs(30);
            let mut job = sale_job();
            let mut now = t0();
            let mut terminal_seen: Option<JobStatus> = None;

            for s in steps {
                let before = job.retry_count;
                match s {
                    Step::Claim => { let _ = job.claim(now); }
                    Step::FailTransient => {
                        let _ = job.fail("Printer offline", None, FailureKind::Transient, &policy, now);
                    }
                    Step::FailPermanent => {
                        let _ = job.fail("Duplicate fiscal document", None, FailureKind::Permanent, &policy, now);
                    }
                    Step::Complete => { let _ = job.complete(fn001(), None, now); }
                    Step::Advance(secs) => {
                        now += chrono::Duration::seconds(secs);
                        job.reap(now, timeout, cooldown);
                    }
                }

                prop_assert!(job.retry_count >= before);
                prop_assert_eq!(job.picked_up_at.is_some(), job.status == JobStatus::Processing);
                prop_assert!(job.retry_count <= policy.max_retries);

                if let Some(terminal) = terminal_seen {
                    prop_assert_eq!(job.status, terminal);
                }
                if job.status.is_terminal() {
                    terminal_seen = Some(job.status);
                }
            }
        }
    }
}
