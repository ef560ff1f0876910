//! Fiscal job dispatch.
//!
//! ## Flow
//!
//! ```text
//! enqueue ──► pending ──poll (reap, claim ≤ batch)──► processing
//!                ▲                                     │
//!                │  transient, retries left            ├── complete ──► completed
//!                └──────────────── fail ◄──────────────┤
//!                                   │                  └── stuck > timeout ──► pending (+cooldown)
//!                                   └─ permanent / ceiling ──► failed
//! ```
//!
//! Shift jobs additionally update the shift status cache and the durable
//! printer config on completion.

pub mod error;
pub mod queue;
pub mod reaper;
pub mod service;
pub mod shift_sync;

pub use error::DispatchError;
pub use queue::{DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT};
pub use reaper::Reaper;
pub use service::{
    BridgeRegistration, CompleteJob, DispatchService, DispatchStores, FailJob, PushStatus,
};
pub use shift_sync::ShiftSync;

#[cfg(test)]
mod tests;
