//! Shift status fast layer.
//!
//! Entries expire after a TTL; an expired or missing entry means the bridge is
//! presumed offline. Writes are last-writer-wins.

use async_trait::async_trait;

use fiscalbridge_core::AccountId;
use fiscalbridge_fiscal::ShiftStatus;

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;

pub use memory::InMemoryShiftStatusCache;
#[cfg(feature = "redis")]
pub use self::redis::RedisShiftStatusCache;

#[async_trait]
pub trait ShiftStatusCache: Send + Sync {
    async fn put(&self, account_id: AccountId, status: &ShiftStatus) -> Result<(), CacheError>;

    async fn get(&self, account_id: AccountId) -> Result<Option<ShiftStatus>, CacheError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),
    #[error("cache entry could not be (de)serialized: {0}")]
    Serialize(String),
}

/// Cache key of an account's shift status.
pub fn shift_status_key(account_id: AccountId) -> String {
    format!("shift_status:{account_id}")
}
