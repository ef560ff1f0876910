//! Bridge protocol: register, poll, heartbeat, complete, fail, shift status.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use fiscalbridge_auth::{BridgeCredential, BridgeHeartbeat};
use fiscalbridge_core::{AccountId, BridgeId, Clock, JobId};
use fiscalbridge_fiscal::{
    FailureClassifier, FailureOutcome, FiscalPrinterJob, FiscalResult, ProviderId,
    ProviderRegistry, ShiftStatus, ShiftUpdate,
};

use super::error::DispatchError;
use super::reaper::Reaper;
use super::shift_sync::ShiftSync;
use crate::config::DispatchConfig;
use crate::credentials::{CredentialStore, InMemoryCredentialStore};
use crate::jobs::{FiscalJobStore, InMemoryFiscalJobStore, JobTransition};
use crate::printers::{InMemoryPrinterConfigStore, PrinterConfigStore};
use crate::shift_cache::{InMemoryShiftStatusCache, ShiftStatusCache};

/// The storage backends a `DispatchService` coordinates.
#[derive(Clone)]
pub struct DispatchStores {
    pub jobs: Arc<dyn FiscalJobStore>,
    pub credentials: Arc<dyn CredentialStore>,
    pub printers: Arc<dyn PrinterConfigStore>,
    pub shift_cache: Arc<dyn ShiftStatusCache>,
}

impl DispatchStores {
    pub fn in_memory(config: &DispatchConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            jobs: Arc::new(InMemoryFiscalJobStore::new()),
            credentials: Arc::new(InMemoryCredentialStore::new()),
            printers: Arc::new(InMemoryPrinterConfigStore::new()),
            shift_cache: Arc::new(InMemoryShiftStatusCache::new(config.shift_status_ttl, clock)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BridgeRegistration {
    pub account_id: AccountId,
    pub bridge_id: BridgeId,
    pub bridge_name: String,
    pub poll_interval_ms: u64,
}

/// Success report for a sale/return job.
#[derive(Debug, Clone, Default)]
pub struct CompleteJob {
    pub fiscal_number: Option<String>,
    pub fiscal_document_id: Option<String>,
    pub response: Option<serde_json::Value>,
}

/// Failure report for any job.
#[derive(Debug, Clone, Default)]
pub struct FailJob {
    pub error: Option<String>,
    pub response: Option<serde_json::Value>,
}

/// Unsolicited shift state report from a bridge.
#[derive(Debug, Clone, Default)]
pub struct PushStatus {
    pub shift_open: Option<bool>,
    pub shift_opened_at: Option<String>,
    pub provider: Option<String>,
}

/// Coordinates the job store, credential store, printer configs and shift cache.
///
/// Handlers are stateless; all per-account state lives in the stores and is
/// addressed by the `AccountId` of the authenticated bridge.
#[derive(Clone)]
pub struct DispatchService {
    pub(crate) jobs: Arc<dyn FiscalJobStore>,
    pub(crate) credentials: Arc<dyn CredentialStore>,
    pub(crate) printers: Arc<dyn PrinterConfigStore>,
    pub(crate) shift_sync: ShiftSync,
    pub(crate) providers: Arc<ProviderRegistry>,
    pub(crate) classifier: FailureClassifier,
    pub(crate) reaper: Reaper,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) config: DispatchConfig,
}

impl DispatchService {
    pub fn new(stores: DispatchStores, config: DispatchConfig, clock: Arc<dyn Clock>) -> Self {
        let reaper = Reaper::new(stores.jobs.clone(), config.stuck_timeout, config.reap_cooldown);
        let shift_sync = ShiftSync::new(
            stores.shift_cache.clone(),
            stores.printers.clone(),
            config.merchant_offset,
        );

        Self {
            jobs: stores.jobs,
            credentials: stores.credentials,
            printers: stores.printers,
            shift_sync,
            providers: Arc::new(ProviderRegistry::with_defaults()),
            classifier: config.failure_classifier.clone(),
            reaper,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Resolve a bearer token to an active credential, refreshing its presence.
    pub async fn authenticate(
        &self,
        token: &str,
        heartbeat: &BridgeHeartbeat,
    ) -> Result<BridgeCredential, DispatchError> {
        if token.trim().is_empty() {
            return Err(DispatchError::Unauthorized);
        }
        self.credentials
            .authenticate(token, heartbeat, self.clock.now())
            .await?
            .ok_or(DispatchError::Unauthorized)
    }

    pub async fn register(
        &self,
        token: &str,
        heartbeat: &BridgeHeartbeat,
    ) -> Result<BridgeRegistration, DispatchError> {
        let credential = self.authenticate(token, heartbeat).await?;
        tracing::info!(
            account_id = %credential.account_id,
            bridge_id = %credential.id,
            version = ?credential.last_version,
            "bridge registered"
        );
        Ok(BridgeRegistration {
            account_id: credential.account_id,
            bridge_id: credential.id,
            bridge_name: credential.name,
            poll_interval_ms: self.config.poll_interval_ms,
        })
    }

    pub async fn heartbeat(
        &self,
        token: &str,
        heartbeat: &BridgeHeartbeat,
    ) -> Result<DateTime<Utc>, DispatchError> {
        let credential = self.authenticate(token, heartbeat).await?;
        Ok(credential.last_heartbeat_at.unwrap_or_else(|| self.clock.now()))
    }

    /// Reap this account's stuck jobs, then claim the next batch.
    pub async fn poll(&self, account_id: AccountId) -> Result<Vec<FiscalPrinterJob>, DispatchError> {
        let now = self.clock.now();
        self.reaper.reap(account_id, now).await?;

        let jobs = self
            .jobs
            .claim_batch(account_id, now, self.config.batch_size)
            .await?;

        if !jobs.is_empty() {
            tracing::info!(account_id = %account_id, count = jobs.len(), "fiscal jobs claimed");
        }
        Ok(jobs)
    }

    pub async fn complete(
        &self,
        account_id: AccountId,
        job_id: JobId,
        report: CompleteJob,
    ) -> Result<FiscalPrinterJob, DispatchError> {
        let fiscal_number = report
            .fiscal_number
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| DispatchError::field("fiscal_number", "fiscal_number is required"))?;

        // Shift jobs complete only through complete_shift_operation.
        let job = self
            .jobs
            .get(account_id, job_id)
            .await?
            .ok_or_else(|| DispatchError::not_found(format!("job {job_id} not found")))?;
        if job.operation_type.is_shift_operation() {
            return Err(DispatchError::not_found(format!(
                "job {job_id} is a shift operation"
            )));
        }

        let applied = self
            .jobs
            .apply(
                account_id,
                job_id,
                JobTransition::Complete {
                    result: FiscalResult {
                        fiscal_number,
                        fiscal_document_id: report.fiscal_document_id,
                    },
                    response: report.response,
                },
                self.clock.now(),
            )
            .await?;

        tracing::info!(
            account_id = %account_id,
            job_id = %job_id,
            fiscal_number = ?applied.job.fiscal_number,
            "fiscal job completed"
        );
        Ok(applied.job)
    }

    /// Complete a shift job and mirror the resulting shift state.
    ///
    /// A failing shift sync is logged; the completion itself stands.
    pub async fn complete_shift_operation(
        &self,
        account_id: AccountId,
        job_id: JobId,
        response: Option<serde_json::Value>,
    ) -> Result<FiscalPrinterJob, DispatchError> {
        let job = self
            .jobs
            .get(account_id, job_id)
            .await?
            .ok_or_else(|| DispatchError::not_found(format!("job {job_id} not found")))?;
        if !job.operation_type.is_shift_operation() {
            return Err(DispatchError::not_found(format!(
                "job {job_id} is not a shift operation"
            )));
        }

        let now = self.clock.now();
        let applied = self
            .jobs
            .apply(account_id, job_id, JobTransition::CompleteShift { response }, now)
            .await?;

        tracing::info!(
            account_id = %account_id,
            job_id = %job_id,
            operation = applied.job.operation_type.as_str(),
            "shift operation completed"
        );

        if let Some(update) = self.shift_sync.update_from_completion(&applied.job, now) {
            if let Err(err) = self.shift_sync.record(account_id, &update, now).await {
                tracing::error!(
                    account_id = %account_id,
                    job_id = %job_id,
                    error = %err,
                    "shift state sync failed after shift operation"
                );
            }
        }

        Ok(applied.job)
    }

    pub async fn fail(
        &self,
        account_id: AccountId,
        job_id: JobId,
        report: FailJob,
    ) -> Result<(FiscalPrinterJob, FailureOutcome), DispatchError> {
        let error = report
            .error
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| DispatchError::field("error", "error is required"))?;

        let kind = self.classifier.classify(&error);
        let applied = self
            .jobs
            .apply(
                account_id,
                job_id,
                JobTransition::Fail {
                    error: error.clone(),
                    response: report.response,
                    kind,
                    policy: self.config.retry_policy.clone(),
                },
                self.clock.now(),
            )
            .await?;

        let outcome = applied.failure.ok_or_else(|| {
            DispatchError::Store(format!("job {job_id}: failure outcome missing"))
        })?;

        if outcome.can_retry {
            tracing::warn!(
                account_id = %account_id,
                job_id = %job_id,
                retry_count = outcome.retry_count,
                next_retry_at = ?outcome.next_retry_at,
                error = %error,
                "fiscal job failed; retry scheduled"
            );
        } else {
            tracing::error!(
                account_id = %account_id,
                job_id = %job_id,
                retry_count = outcome.retry_count,
                retriable = outcome.is_retriable,
                error = %error,
                "fiscal job failed permanently"
            );
        }

        Ok((applied.job, outcome))
    }

    /// Provider-formatted shift status request for the account's printer.
    pub async fn shift_status_request(
        &self,
        account_id: AccountId,
    ) -> Result<serde_json::Value, DispatchError> {
        let config = self
            .printers
            .get_active(account_id)
            .await?
            .ok_or_else(|| DispatchError::not_found("no active fiscal printer config"))?;

        let provider = self.providers.get(&config.provider).ok_or_else(|| {
            DispatchError::not_found(format!("fiscal provider {} is not registered", config.provider))
        })?;

        Ok(provider.format_shift_status_request(&config)?)
    }

    pub async fn push_status(
        &self,
        account_id: AccountId,
        report: PushStatus,
    ) -> Result<ShiftStatus, DispatchError> {
        let shift_open = report
            .shift_open
            .ok_or_else(|| DispatchError::field("shift_open", "shift_open is required"))?;
        let provider = report
            .provider
            .filter(|p| !p.trim().is_empty())
            .map(ProviderId::new)
            .ok_or_else(|| DispatchError::field("provider", "provider is required"))?;

        let update = if shift_open {
            let opened_at = self
                .shift_sync
                .parse_opened_at(account_id, report.shift_opened_at.as_deref());
            ShiftUpdate::opened(provider, opened_at)
        } else {
            ShiftUpdate::closed(provider)
        };

        Ok(self
            .shift_sync
            .record(account_id, &update, self.clock.now())
            .await?)
    }
}
