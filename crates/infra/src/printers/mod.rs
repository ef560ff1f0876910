//! Fiscal printer configuration persistence.

pub mod postgres;
pub mod store;

pub use postgres::PostgresPrinterConfigStore;
pub use store::{ConfigStoreError, InMemoryPrinterConfigStore, PrinterConfigStore};
