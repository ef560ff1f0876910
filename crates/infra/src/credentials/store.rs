//! Bridge credential storage.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use fiscalbridge_auth::{BridgeCredential, BridgeHeartbeat};
use fiscalbridge_core::{AccountId, BridgeId};

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn insert(&self, credential: BridgeCredential) -> Result<BridgeCredential, CredentialStoreError>;

    /// Resolve an active credential by token and record the heartbeat in the
    /// same step. Unknown and revoked tokens both yield `None`.
    async fn authenticate(
        &self,
        token: &str,
        heartbeat: &BridgeHeartbeat,
        now: DateTime<Utc>,
    ) -> Result<Option<BridgeCredential>, CredentialStoreError>;

    async fn get(
        &self,
        account_id: AccountId,
        bridge_id: BridgeId,
    ) -> Result<Option<BridgeCredential>, CredentialStoreError>;

    /// Credentials of an account, oldest first.
    async fn list(&self, account_id: AccountId) -> Result<Vec<BridgeCredential>, CredentialStoreError>;

    /// Revoke a credential. Revoking an already revoked credential is a no-op.
    async fn revoke(
        &self,
        account_id: AccountId,
        bridge_id: BridgeId,
        now: DateTime<Utc>,
    ) -> Result<Option<BridgeCredential>, CredentialStoreError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum CredentialStoreError {
    #[error("credential already exists: {0}")]
    AlreadyExists(BridgeId),
    #[error("storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Default)]
struct Credentials {
    by_id: HashMap<BridgeId, BridgeCredential>,
    by_token: HashMap<String, BridgeId>,
}

/// In-memory credential store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    inner: RwLock<Credentials>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Credentials>, CredentialStoreError> {
        self.inner
            .read()
            .map_err(|_| CredentialStoreError::Storage("credential store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Credentials>, CredentialStoreError> {
        self.inner
            .write()
            .map_err(|_| CredentialStoreError::Storage("credential store lock poisoned".into()))
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn insert(&self, credential: BridgeCredential) -> Result<BridgeCredential, CredentialStoreError> {
        let mut inner = self.write()?;
        if inner.by_id.contains_key(&credential.id)
            || inner.by_token.contains_key(credential.token.as_str())
        {
            return Err(CredentialStoreError::AlreadyExists(credential.id));
        }
        inner
            .by_token
            .insert(credential.token.as_str().to_string(), credential.id);
        inner.by_id.insert(credential.id, credential.clone());
        Ok(credential)
    }

    async fn authenticate(
        &self,
        token: &str,
        heartbeat: &BridgeHeartbeat,
        now: DateTime<Utc>,
    ) -> Result<Option<BridgeCredential>, CredentialStoreError> {
        let mut inner = self.write()?;
        let Some(id) = inner.by_token.get(token).copied() else {
            return Ok(None);
        };
        let Some(credential) = inner.by_id.get_mut(&id) else {
            return Ok(None);
        };
        if credential.authenticate().is_err() {
            return Ok(None);
        }
        credential.record_heartbeat(heartbeat, now);
        Ok(Some(credential.clone()))
    }

    async fn get(
        &self,
        account_id: AccountId,
        bridge_id: BridgeId,
    ) -> Result<Option<BridgeCredential>, CredentialStoreError> {
        let inner = self.read()?;
        Ok(inner
            .by_id
            .get(&bridge_id)
            .filter(|c| c.account_id == account_id)
            .cloned())
    }

    async fn list(&self, account_id: AccountId) -> Result<Vec<BridgeCredential>, CredentialStoreError> {
        let inner = self.read()?;
        let mut result: Vec<_> = inner
            .by_id
            .values()
            .filter(|c| c.account_id == account_id)
            .cloned()
            .collect();
        result.sort_by_key(|c| (c.created_at, c.id));
        Ok(result)
    }

    async fn revoke(
        &self,
        account_id: AccountId,
        bridge_id: BridgeId,
        now: DateTime<Utc>,
    ) -> Result<Option<BridgeCredential>, CredentialStoreError> {
        let mut inner = self.write()?;
        Ok(inner
            .by_id
            .get_mut(&bridge_id)
            .filter(|c| c.account_id == account_id)
            .map(|c| {
                c.revoke(now);
                c.clone()
            }))
    }
}
