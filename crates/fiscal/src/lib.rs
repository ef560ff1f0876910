//! `fiscalbridge-fiscal` — fiscal job domain.
//!
//! ## Components
//!
//! - `FiscalPrinterJob`: the unit of work and its lifecycle
//!   (`pending → processing → completed | pending(retry) | failed`)
//! - `RetryPolicy`: bounded, non-decreasing retry backoff
//! - `FailureClassifier`: permanent vs transient fiscal errors
//! - `ShiftStatus`: the shift open/closed projection and its timestamp formats
//! - `FiscalPrinterConfig`: per-account printer configuration (durable shift layer)
//! - `ProviderRegistry`: per-provider request formatters
//!
//! Everything here is pure: time is always passed in as `now`.

pub mod classify;
pub mod job;
pub mod printer;
pub mod provider;
pub mod retry;
pub mod shift;

pub use classify::{FailureClassifier, FailureKind};
pub use job::{
    FailureOutcome, FiscalPrinterJob, FiscalResult, JobStatus, NewFiscalJob, OperationType,
    ProviderId,
};
pub use printer::FiscalPrinterConfig;
pub use provider::{FiscalProvider, GenericJsonProvider, ProviderRegistry};
pub use retry::{BackoffStrategy, RetryPolicy};
pub use shift::{
    parse_shift_opened_at, ShiftStatus, ShiftStatusView, ShiftTimestampFormat, ShiftUpdate,
};
