use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use fiscalbridge_core::{AccountId, Clock};
use fiscalbridge_fiscal::ShiftStatus;

use super::{shift_status_key, CacheError, ShiftStatusCache};

/// Process-local TTL cache, driven by a `Clock` so expiry is testable.
pub struct InMemoryShiftStatusCache {
    entries: RwLock<HashMap<String, (ShiftStatus, DateTime<Utc>)>>,
    ttl: chrono::Duration,
    clock: Arc<dyn Clock>,
}

impl InMemoryShiftStatusCache {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::seconds(120)),
            clock,
        }
    }
}

fn poisoned<T>(_: T) -> CacheError {
    CacheError::Backend("shift cache lock poisoned".into())
}

#[async_trait]
impl ShiftStatusCache for InMemoryShiftStatusCache {
    async fn put(&self, account_id: AccountId, status: &ShiftStatus) -> Result<(), CacheError> {
        let expires_at = self.clock.now() + self.ttl;
        let mut entries = self.entries.write().map_err(poisoned)?;
        entries.insert(shift_status_key(account_id), (status.clone(), expires_at));
        Ok(())
    }

    async fn get(&self, account_id: AccountId) -> Result<Option<ShiftStatus>, CacheError> {
        let now = self.clock.now();
        let key = shift_status_key(account_id);

        let mut entries = self.entries.write().map_err(poisoned)?;
        match entries.get(&key) {
            Some((status, expires_at)) if *expires_at > now => Ok(Some(status.clone())),
            Some(_) => {
                entries.remove(&key);
                Ok(None)
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fiscalbridge_core::ManualClock;
    use fiscalbridge_fiscal::{ProviderId, ShiftUpdate};

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache = InMemoryShiftStatusCache::new(Duration::from_secs(120), clock.clone());
        let account = AccountId::new();

        let status = ShiftUpdate::opened(ProviderId::new("generic"), Some(clock.now()))
            .to_status(clock.now());
        cache.put(account, &status).await.unwrap();

        clock.advance(chrono::Duration::seconds(119));
        assert_eq!(cache.get(account).await.unwrap(), Some(status.clone()));

        clock.advance(chrono::Duration::seconds(1));
        assert_eq!(cache.get(account).await.unwrap(), None);
    }

    #[tokio::test]
    async fn last_writer_wins() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache = InMemoryShiftStatusCache::new(Duration::from_secs(120), clock.clone());
        let account = AccountId::new();
        let provider = ProviderId::new("generic");

        cache
            .put(account, &ShiftUpdate::opened(provider.clone(), None).to_status(clock.now()))
            .await
            .unwrap();
        cache
            .put(account, &ShiftUpdate::closed(provider).to_status(clock.now()))
            .await
            .unwrap();

        assert!(!cache.get(account).await.unwrap().unwrap().shift_open);
    }
}
