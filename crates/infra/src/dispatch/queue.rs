//! Collaborator-facing operations: job creation and read views, shift
//! requests, printer configuration and bridge provisioning.

use fiscalbridge_auth::BridgeCredential;
use fiscalbridge_core::{AccountId, BridgeId, JobId};
use fiscalbridge_fiscal::{
    FiscalPrinterConfig, FiscalPrinterJob, JobStatus, NewFiscalJob, OperationType, ProviderId,
    ShiftStatusView,
};

use super::error::DispatchError;
use super::service::DispatchService;
use crate::jobs::JobStats;

pub const DEFAULT_LIST_LIMIT: usize = 50;
pub const MAX_LIST_LIMIT: usize = 200;

impl DispatchService {
    /// Queue a job for the account's bridge.
    pub async fn enqueue(
        &self,
        account_id: AccountId,
        request: NewFiscalJob,
    ) -> Result<FiscalPrinterJob, DispatchError> {
        request.validate()?;
        let job = FiscalPrinterJob::new(account_id, request, self.clock.now());
        let job = self.jobs.insert(job).await?;

        tracing::info!(
            account_id = %account_id,
            job_id = %job.id,
            operation = job.operation_type.as_str(),
            provider = %job.provider,
            "fiscal job enqueued"
        );
        Ok(job)
    }

    /// Queue a shift open/close/status job formatted by the account's provider.
    pub async fn request_shift_operation(
        &self,
        account_id: AccountId,
        operation: OperationType,
    ) -> Result<FiscalPrinterJob, DispatchError> {
        if !operation.is_shift_operation() {
            return Err(DispatchError::field(
                "operation",
                format!("{} is not a shift operation", operation.as_str()),
            ));
        }

        let config = self
            .printers
            .get_active(account_id)
            .await?
            .ok_or_else(|| DispatchError::not_found("no active fiscal printer config"))?;
        let provider = self.providers.get(&config.provider).ok_or_else(|| {
            DispatchError::not_found(format!("fiscal provider {} is not registered", config.provider))
        })?;

        let request_data = provider.format_shift_operation(operation, &config)?;
        self.enqueue(
            account_id,
            NewFiscalJob::shift(operation, config.provider.clone(), request_data),
        )
        .await
    }

    pub async fn job_status(
        &self,
        account_id: AccountId,
        job_id: JobId,
    ) -> Result<FiscalPrinterJob, DispatchError> {
        self.jobs
            .get(account_id, job_id)
            .await?
            .ok_or_else(|| DispatchError::not_found(format!("job {job_id} not found")))
    }

    /// Newest jobs first. `limit` defaults to 50 and is capped at 200.
    pub async fn list_jobs(
        &self,
        account_id: AccountId,
        status: Option<JobStatus>,
        limit: Option<usize>,
    ) -> Result<Vec<FiscalPrinterJob>, DispatchError> {
        let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
        Ok(self.jobs.list(account_id, status, limit).await?)
    }

    pub async fn job_stats(&self, account_id: AccountId) -> Result<JobStats, DispatchError> {
        Ok(self.jobs.stats(account_id).await?)
    }

    pub async fn shift_status(&self, account_id: AccountId) -> ShiftStatusView {
        self.shift_sync.read(account_id).await
    }

    /// Create or replace the account's printer config. Recorded shift state
    /// survives reconfiguration.
    pub async fn upsert_printer_config(
        &self,
        account_id: AccountId,
        provider: String,
        settings: serde_json::Value,
        is_active: bool,
    ) -> Result<FiscalPrinterConfig, DispatchError> {
        if provider.trim().is_empty() {
            return Err(DispatchError::field("provider", "provider is required"));
        }
        let provider = ProviderId::new(provider.trim());
        let now = self.clock.now();

        let config = match self.printers.get(account_id).await? {
            Some(mut existing) => {
                existing.reconfigure(provider, settings, is_active, now)?;
                existing
            }
            None => {
                let mut config = FiscalPrinterConfig::new(account_id, provider, settings, now)?;
                config.is_active = is_active;
                config
            }
        };

        if self.providers.get(&config.provider).is_none() {
            tracing::warn!(
                account_id = %account_id,
                provider = %config.provider,
                "printer config references an unregistered provider"
            );
        }

        Ok(self.printers.upsert(config).await?)
    }

    /// Issue a new bridge credential. The returned credential carries the
    /// token; it is never shown again.
    pub async fn provision_bridge(
        &self,
        account_id: AccountId,
        name: &str,
    ) -> Result<BridgeCredential, DispatchError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DispatchError::field("name", "name is required"));
        }

        let credential = self
            .credentials
            .insert(BridgeCredential::issue(account_id, name, self.clock.now()))
            .await?;

        tracing::info!(
            account_id = %account_id,
            bridge_id = %credential.id,
            token = %credential.token.fingerprint(),
            "bridge credential provisioned"
        );
        Ok(credential)
    }

    pub async fn list_bridges(&self, account_id: AccountId) -> Result<Vec<BridgeCredential>, DispatchError> {
        Ok(self.credentials.list(account_id).await?)
    }

    pub async fn revoke_bridge(
        &self,
        account_id: AccountId,
        bridge_id: BridgeId,
    ) -> Result<BridgeCredential, DispatchError> {
        let credential = self
            .credentials
            .revoke(account_id, bridge_id, self.clock.now())
            .await?
            .ok_or_else(|| DispatchError::not_found(format!("bridge {bridge_id} not found")))?;

        tracing::info!(account_id = %account_id, bridge_id = %bridge_id, "bridge credential revoked");
        Ok(credential)
    }
}
