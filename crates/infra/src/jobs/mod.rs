//! Fiscal printer job persistence.
//!
//! ## Components
//!
//! - `FiscalJobStore`: account-scoped job persistence with atomic claim,
//!   reap and read-modify-write transitions
//! - `InMemoryFiscalJobStore`: single-lock store for tests/dev
//! - `PostgresFiscalJobStore`: row-locking store for production
//! - `JobTransition`: the bridge-reported changes a store applies

pub mod postgres;
pub mod store;
pub mod types;

pub use postgres::PostgresFiscalJobStore;
pub use store::{FiscalJobStore, InMemoryFiscalJobStore, JobStoreError};
pub use types::{AppliedTransition, JobStats, JobTransition};
