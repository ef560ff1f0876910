//! Printer configuration storage (durable shift layer).

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use fiscalbridge_core::AccountId;
use fiscalbridge_fiscal::{FiscalPrinterConfig, ShiftUpdate};

#[async_trait]
pub trait PrinterConfigStore: Send + Sync {
    /// The account's config, if it exists and is active.
    async fn get_active(
        &self,
        account_id: AccountId,
    ) -> Result<Option<FiscalPrinterConfig>, ConfigStoreError>;

    /// The account's config regardless of `is_active`.
    async fn get(&self, account_id: AccountId) -> Result<Option<FiscalPrinterConfig>, ConfigStoreError>;

    /// Insert or replace the account's config.
    async fn upsert(&self, config: FiscalPrinterConfig) -> Result<FiscalPrinterConfig, ConfigStoreError>;

    /// Mirror a shift update into the active config.
    ///
    /// Returns `None` when the account has no active config.
    async fn apply_shift(
        &self,
        account_id: AccountId,
        update: &ShiftUpdate,
        now: DateTime<Utc>,
    ) -> Result<Option<FiscalPrinterConfig>, ConfigStoreError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigStoreError {
    #[error("storage error: {0}")]
    Storage(String),
}

/// In-memory printer config store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryPrinterConfigStore {
    configs: RwLock<HashMap<AccountId, FiscalPrinterConfig>>,
}

impl InMemoryPrinterConfigStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> ConfigStoreError {
    ConfigStoreError::Storage("printer config store lock poisoned".into())
}

#[async_trait]
impl PrinterConfigStore for InMemoryPrinterConfigStore {
    async fn get_active(
        &self,
        account_id: AccountId,
    ) -> Result<Option<FiscalPrinterConfig>, ConfigStoreError> {
        let configs = self.configs.read().map_err(poisoned)?;
        Ok(configs.get(&account_id).filter(|c| c.is_active).cloned())
    }

    async fn get(&self, account_id: AccountId) -> Result<Option<FiscalPrinterConfig>, ConfigStoreError> {
        let configs = self.configs.read().map_err(poisoned)?;
        Ok(configs.get(&account_id).cloned())
    }

    async fn upsert(&self, config: FiscalPrinterConfig) -> Result<FiscalPrinterConfig, ConfigStoreError> {
        let mut configs = self.configs.write().map_err(poisoned)?;
        configs.insert(config.account_id, config.clone());
        Ok(config)
    }

    async fn apply_shift(
        &self,
        account_id: AccountId,
        update: &ShiftUpdate,
        now: DateTime<Utc>,
    ) -> Result<Option<FiscalPrinterConfig>, ConfigStoreError> {
        let mut configs = self.configs.write().map_err(poisoned)?;
        Ok(configs
            .get_mut(&account_id)
            .filter(|c| c.is_active)
            .map(|c| {
                c.apply_shift(update, now);
                c.clone()
            }))
    }
}
