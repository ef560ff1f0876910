//! Redis-backed shift status cache (optional).
//!
//! Entries are JSON strings written with `SET key value EX ttl`, so expiry is
//! enforced by Redis itself.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;

use fiscalbridge_core::AccountId;
use fiscalbridge_fiscal::ShiftStatus;

use super::{shift_status_key, CacheError, ShiftStatusCache};

#[derive(Debug, Clone)]
pub struct RedisShiftStatusCache {
    client: redis::Client,
    ttl_secs: u64,
}

impl RedisShiftStatusCache {
    pub fn new(redis_url: impl AsRef<str>, ttl: Duration) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        Ok(Self {
            client,
            ttl_secs: ttl.as_secs().max(1),
        })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, CacheError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))
    }
}

#[async_trait]
impl ShiftStatusCache for RedisShiftStatusCache {
    async fn put(&self, account_id: AccountId, status: &ShiftStatus) -> Result<(), CacheError> {
        let payload =
            serde_json::to_string(status).map_err(|e| CacheError::Serialize(e.to_string()))?;

        let mut conn = self.connection().await?;
        let _: () = conn
            .set_ex(shift_status_key(account_id), payload, self.ttl_secs)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn get(&self, account_id: AccountId) -> Result<Option<ShiftStatus>, CacheError> {
        let mut conn = self.connection().await?;
        let payload: Option<String> = conn
            .get(shift_status_key(account_id))
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))?;

        payload
            .map(|p| serde_json::from_str(&p).map_err(|e| CacheError::Serialize(e.to_string())))
            .transpose()
    }
}
