use std::sync::Arc;

use fiscalbridge_core::{Clock, SystemClock};
use fiscalbridge_infra::{DispatchConfig, DispatchService, DispatchStores};

#[cfg(feature = "redis")]
use fiscalbridge_infra::shift_cache::{CacheError, RedisShiftStatusCache};
#[cfg(feature = "redis")]
use sqlx::PgPool;

use super::config::AppConfig;

#[derive(Debug, thiserror::Error)]
pub enum ServicesError {
    #[error("DATABASE_URL must be set when USE_PERSISTENT_STORES=true")]
    MissingDatabaseUrl,

    #[error("postgres: {0}")]
    Database(#[from] sqlx::Error),

    #[cfg(feature = "redis")]
    #[error("redis: {0}")]
    Cache(#[from] CacheError),
}

#[derive(Clone)]
pub enum AppServices {
    InMemory {
        dispatch: DispatchService,
    },
    #[cfg(feature = "redis")]
    Persistent {
        dispatch: DispatchService,
        pool: PgPool,
    },
}

impl AppServices {
    pub fn dispatch(&self) -> &DispatchService {
        match self {
            AppServices::InMemory { dispatch } => dispatch,
            #[cfg(feature = "redis")]
            AppServices::Persistent { dispatch, .. } => dispatch,
        }
    }

    pub fn backend(&self) -> &'static str {
        match self {
            AppServices::InMemory { .. } => "in_memory",
            #[cfg(feature = "redis")]
            AppServices::Persistent { .. } => "postgres",
        }
    }

    /// Liveness of the backing stores.
    pub async fn ping(&self) -> bool {
        match self {
            AppServices::InMemory { .. } => true,
            #[cfg(feature = "redis")]
            AppServices::Persistent { pool, .. } => {
                sqlx::query("SELECT 1").execute(pool).await.is_ok()
            }
        }
    }
}

pub async fn build_services(config: &AppConfig) -> Result<AppServices, ServicesError> {
    if config.use_persistent_stores {
        #[cfg(feature = "redis")]
        {
            return build_persistent_services(config).await;
        }
        #[cfg(not(feature = "redis"))]
        {
            tracing::warn!(
                "USE_PERSISTENT_STORES=true but redis feature not enabled, falling back to in-memory"
            );
        }
    }

    Ok(in_memory_services(config.dispatch.clone(), Arc::new(SystemClock)))
}

/// In-memory wiring (dev/test). State lives as long as the process.
pub fn in_memory_services(config: DispatchConfig, clock: Arc<dyn Clock>) -> AppServices {
    let stores = DispatchStores::in_memory(&config, clock.clone());
    AppServices::InMemory {
        dispatch: DispatchService::new(stores, config, clock),
    }
}

#[cfg(feature = "redis")]
async fn build_persistent_services(config: &AppConfig) -> Result<AppServices, ServicesError> {
    let database_url = config
        .database_url
        .as_deref()
        .ok_or(ServicesError::MissingDatabaseUrl)?;

    let pool = PgPool::connect(database_url).await?;
    fiscalbridge_infra::schema::ensure_schema(&pool).await?;

    let cache = Arc::new(RedisShiftStatusCache::new(
        &config.redis_url,
        config.dispatch.shift_status_ttl,
    )?);

    let stores = fiscalbridge_infra::postgres_stores(pool.clone(), cache);
    let dispatch = DispatchService::new(stores, config.dispatch.clone(), Arc::new(SystemClock));

    tracing::info!("persistent stores ready (postgres + redis)");
    Ok(AppServices::Persistent { dispatch, pool })
}
