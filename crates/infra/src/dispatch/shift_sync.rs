//! Shift status synchronization between the TTL cache and the printer config.
//!
//! Cache writes are best-effort (a failure is logged), the durable write is
//! authoritative (a failure is returned). Both are always attempted.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};

use fiscalbridge_core::AccountId;
use fiscalbridge_fiscal::{
    parse_shift_opened_at, FiscalPrinterJob, OperationType, ShiftStatus, ShiftStatusView,
    ShiftUpdate,
};

use crate::printers::{ConfigStoreError, PrinterConfigStore};
use crate::shift_cache::ShiftStatusCache;

#[derive(Clone)]
pub struct ShiftSync {
    cache: Arc<dyn ShiftStatusCache>,
    printers: Arc<dyn PrinterConfigStore>,
    merchant_offset: FixedOffset,
}

impl ShiftSync {
    pub fn new(
        cache: Arc<dyn ShiftStatusCache>,
        printers: Arc<dyn PrinterConfigStore>,
        merchant_offset: FixedOffset,
    ) -> Self {
        Self {
            cache,
            printers,
            merchant_offset,
        }
    }

    /// Write an update to both layers.
    pub async fn record(
        &self,
        account_id: AccountId,
        update: &ShiftUpdate,
        now: DateTime<Utc>,
    ) -> Result<ShiftStatus, ConfigStoreError> {
        let status = update.to_status(now);

        if let Err(err) = self.cache.put(account_id, &status).await {
            tracing::warn!(
                account_id = %account_id,
                error = %err,
                "shift status cache write failed"
            );
        }

        match self.printers.apply_shift(account_id, update, now).await? {
            Some(_) => {}
            None => tracing::warn!(
                account_id = %account_id,
                "no active printer config; shift state kept in cache only"
            ),
        }

        tracing::info!(
            account_id = %account_id,
            shift_open = status.shift_open,
            provider = %status.provider,
            "shift status recorded"
        );
        Ok(status)
    }

    /// Read view for UIs. Cache errors count as a miss.
    pub async fn read(&self, account_id: AccountId) -> ShiftStatusView {
        match self.cache.get(account_id).await {
            Ok(entry) => ShiftStatusView::from_cache(entry),
            Err(err) => {
                tracing::warn!(
                    account_id = %account_id,
                    error = %err,
                    "shift status cache read failed; reporting offline"
                );
                ShiftStatusView::offline()
            }
        }
    }

    /// Parse a bridge-reported opening time. Failures are logged and yield `None`.
    pub fn parse_opened_at(&self, account_id: AccountId, raw: Option<&str>) -> Option<DateTime<Utc>> {
        let raw = raw.filter(|r| !r.trim().is_empty())?;
        match parse_shift_opened_at(raw, self.merchant_offset) {
            Ok((at, format)) => {
                tracing::debug!(
                    account_id = %account_id,
                    format = ?format,
                    format_version = format.version(),
                    "parsed shift_opened_at"
                );
                Some(at)
            }
            Err(err) => {
                tracing::warn!(
                    account_id = %account_id,
                    raw = %raw,
                    error = %err,
                    "ignoring unparseable shift_opened_at"
                );
                None
            }
        }
    }

    /// Shift update implied by a completed shift job, if any.
    pub fn update_from_completion(
        &self,
        job: &FiscalPrinterJob,
        now: DateTime<Utc>,
    ) -> Option<ShiftUpdate> {
        let response = job.response_data.as_ref();
        let reported_opened_at = || {
            self.parse_opened_at(
                job.account_id,
                response
                    .and_then(|r| r.get("shift_opened_at"))
                    .and_then(|v| v.as_str()),
            )
        };

        match job.operation_type {
            OperationType::ShiftOpen => Some(ShiftUpdate::opened(
                job.provider.clone(),
                Some(reported_opened_at().unwrap_or(now)),
            )),
            OperationType::ShiftClose => Some(ShiftUpdate::closed(job.provider.clone())),
            OperationType::ShiftStatus => {
                let open = response?.get("shift_open")?.as_bool()?;
                Some(if open {
                    ShiftUpdate::opened(job.provider.clone(), reported_opened_at())
                } else {
                    ShiftUpdate::closed(job.provider.clone())
                })
            }
            OperationType::Sale | OperationType::Return => None,
        }
    }
}
