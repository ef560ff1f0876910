//! Fiscal provider formatters.
//!
//! A provider turns an account's printer config into the opaque `request_data`
//! a bridge hands to its printer driver. The backend never looks inside.

use std::collections::HashMap;
use std::sync::Arc;

use fiscalbridge_core::{DomainError, DomainResult};

use crate::job::{OperationType, ProviderId};
use crate::printer::FiscalPrinterConfig;

pub trait FiscalProvider: Send + Sync {
    fn id(&self) -> ProviderId;

    /// Payload asking the bridge to read the printer's shift state.
    fn format_shift_status_request(
        &self,
        config: &FiscalPrinterConfig,
    ) -> DomainResult<serde_json::Value>;

    /// Payload for a queued shift operation.
    fn format_shift_operation(
        &self,
        operation: OperationType,
        config: &FiscalPrinterConfig,
    ) -> DomainResult<serde_json::Value>;
}

/// Provider that forwards the config settings as a plain JSON command.
#[derive(Debug, Clone, Default)]
pub struct GenericJsonProvider;

impl GenericJsonProvider {
    pub const ID: &'static str = "generic";
}

impl FiscalProvider for GenericJsonProvider {
    fn id(&self) -> ProviderId {
        ProviderId::new(Self::ID)
    }

    fn format_shift_status_request(
        &self,
        config: &FiscalPrinterConfig,
    ) -> DomainResult<serde_json::Value> {
        self.format_shift_operation(OperationType::ShiftStatus, config)
    }

    fn format_shift_operation(
        &self,
        operation: OperationType,
        config: &FiscalPrinterConfig,
    ) -> DomainResult<serde_json::Value> {
        if !operation.is_shift_operation() {
            return Err(DomainError::validation(format!(
                "{} is not a shift operation",
                operation.as_str()
            )));
        }
        Ok(serde_json::json!({
            "command": operation.as_str(),
            "provider": config.provider.as_str(),
            "settings": config.settings,
        }))
    }
}

/// Providers by id.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<ProviderId, Arc<dyn FiscalProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in providers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(GenericJsonProvider));
        registry
    }

    /// Register a provider, replacing any previous one with the same id.
    pub fn register(&mut self, provider: Arc<dyn FiscalProvider>) {
        self.providers.insert(provider.id(), provider);
    }

    pub fn get(&self, id: &ProviderId) -> Option<Arc<dyn FiscalProvider>> {
        self.providers.get(id).cloned()
    }

    pub fn ids(&self) -> Vec<ProviderId> {
        let mut ids: Vec<_> = self.providers.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.ids())
            .finish()
    }
}
