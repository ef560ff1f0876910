//! Bridge credential persistence.

pub mod postgres;
pub mod store;

pub use postgres::PostgresCredentialStore;
pub use store::{CredentialStore, CredentialStoreError, InMemoryCredentialStore};
