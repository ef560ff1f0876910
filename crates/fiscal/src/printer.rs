//! Per-account fiscal printer configuration.
//!
//! Besides provider selection this is the durable home of the shift state; the
//! TTL cache is a fast mirror of the two `shift_*` fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fiscalbridge_core::{AccountId, DomainError, DomainResult};

use crate::job::ProviderId;
use crate::shift::ShiftUpdate;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FiscalPrinterConfig {
    pub account_id: AccountId,
    pub provider: ProviderId,
    pub is_active: bool,
    /// Provider-specific settings (device address, operator, tax groups...).
    pub settings: serde_json::Value,
    pub shift_open: bool,
    pub shift_opened_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl FiscalPrinterConfig {
    pub fn new(
        account_id: AccountId,
        provider: ProviderId,
        settings: serde_json::Value,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if provider.as_str().trim().is_empty() {
            return Err(DomainError::validation("provider must not be empty"));
        }
        Ok(Self {
            account_id,
            provider,
            is_active: true,
            settings,
            shift_open: false,
            shift_opened_at: None,
            updated_at: now,
        })
    }

    /// Replace provider and settings, keeping the recorded shift state.
    pub fn reconfigure(
        &mut self,
        provider: ProviderId,
        settings: serde_json::Value,
        is_active: bool,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        if provider.as_str().trim().is_empty() {
            return Err(DomainError::validation("provider must not be empty"));
        }
        self.provider = provider;
        self.settings = settings;
        self.is_active = is_active;
        self.updated_at = now;
        Ok(())
    }

    /// Mirror a shift update into the durable fields.
    ///
    /// Closing always clears `shift_opened_at`. Opening without a reported time
    /// keeps a previously recorded one.
    pub fn apply_shift(&mut self, update: &ShiftUpdate, now: DateTime<Utc>) {
        if update.shift_open {
            self.shift_open = true;
            if update.shift_opened_at.is_some() {
                self.shift_opened_at = update.shift_opened_at;
            }
        } else {
            self.shift_open = false;
            self.shift_opened_at = None;
        }
        self.updated_at = now;
    }
}
