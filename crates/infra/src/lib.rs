//! Infrastructure layer: stores (in-memory + Postgres), shift cache
//! (in-memory + Redis), configuration and the dispatch service.

pub mod config;
pub mod credentials;
pub mod dispatch;
pub mod jobs;
pub mod printers;
pub mod schema;
pub mod shift_cache;

pub use config::DispatchConfig;
pub use dispatch::{DispatchError, DispatchService, DispatchStores};

use std::sync::Arc;

use sqlx::PgPool;

/// Postgres-backed stores sharing one pool. The shift cache is supplied by
/// the caller (Redis in production).
pub fn postgres_stores(
    pool: PgPool,
    shift_cache: Arc<dyn shift_cache::ShiftStatusCache>,
) -> DispatchStores {
    DispatchStores {
        jobs: Arc::new(jobs::PostgresFiscalJobStore::new(pool.clone())),
        credentials: Arc::new(credentials::PostgresCredentialStore::new(pool.clone())),
        printers: Arc::new(printers::PostgresPrinterConfigStore::new(pool)),
        shift_cache,
    }
}
