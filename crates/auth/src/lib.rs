//! `fiscalbridge-auth` — bridge credential model and authentication rule.
//!
//! This crate is intentionally decoupled from HTTP and storage: it decides
//! whether a resolved credential may act, and how a successful call refreshes
//! the credential's presence data.

pub mod credential;
pub mod token;

pub use credential::{AuthError, BridgeCredential, BridgeHeartbeat, CredentialStatus};
pub use token::BridgeToken;
