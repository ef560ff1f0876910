use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use fiscalbridge_core::{AccountId, BridgeId};

use crate::BridgeToken;

/// Credential lifecycle. Credentials are never deleted, only revoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CredentialStatus {
    #[default]
    Active,
    Revoked,
}

impl CredentialStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialStatus::Active => "active",
            CredentialStatus::Revoked => "revoked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(CredentialStatus::Active),
            "revoked" => Some(CredentialStatus::Revoked),
            _ => None,
        }
    }
}

/// Authentication failure.
///
/// Unknown and revoked tokens collapse into the same variant so callers cannot
/// probe which tokens exist.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    #[error("invalid or revoked token")]
    InvalidOrRevoked,
}

/// Presence data a bridge reports on any call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BridgeHeartbeat {
    pub version: Option<String>,
    pub info: Option<serde_json::Value>,
}

/// One bridge installation's credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeCredential {
    pub id: BridgeId,
    pub account_id: AccountId,
    pub token: BridgeToken,
    pub name: String,
    pub status: CredentialStatus,
    pub last_version: Option<String>,
    pub last_info: Option<serde_json::Value>,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl BridgeCredential {
    /// Provision a new active credential with a freshly generated token.
    pub fn issue(account_id: AccountId, name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: BridgeId::new(),
            account_id,
            token: BridgeToken::generate(),
            name: name.into(),
            status: CredentialStatus::Active,
            last_version: None,
            last_info: None,
            last_heartbeat_at: None,
            created_at: now,
            revoked_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == CredentialStatus::Active
    }

    /// Check the credential may act.
    pub fn authenticate(&self) -> Result<(), AuthError> {
        if self.is_active() {
            Ok(())
        } else {
            Err(AuthError::InvalidOrRevoked)
        }
    }

    /// Refresh presence after a successful call.
    ///
    /// Version/info are only overwritten when the bridge supplied them.
    pub fn record_heartbeat(&mut self, heartbeat: &BridgeHeartbeat, now: DateTime<Utc>) {
        if let Some(version) = &heartbeat.version {
            self.last_version = Some(version.clone());
        }
        if let Some(info) = &heartbeat.info {
            self.last_info = Some(info.clone());
        }
        self.last_heartbeat_at = Some(now);
    }

    /// Revoke permanently. Revoking twice keeps the first revocation time.
    pub fn revoke(&mut self, now: DateTime<Utc>) {
        if self.status == CredentialStatus::Revoked {
            return;
        }
        self.status = CredentialStatus::Revoked;
        self.revoked_at = Some(now);
    }
}
