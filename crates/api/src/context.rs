use fiscalbridge_core::{AccountId, BridgeId};

/// Authenticated bridge for a protocol request.
///
/// Inserted by the bridge auth middleware; every protocol handler is scoped to
/// `account_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeContext {
    account_id: AccountId,
    bridge_id: BridgeId,
    token: String,
}

impl BridgeContext {
    pub fn new(account_id: AccountId, bridge_id: BridgeId, token: impl Into<String>) -> Self {
        Self {
            account_id,
            bridge_id,
            token: token.into(),
        }
    }

    pub fn account_id(&self) -> AccountId {
        self.account_id
    }

    pub fn bridge_id(&self) -> BridgeId {
        self.bridge_id
    }

    /// Raw bearer token, for calls that re-authenticate with reported version/info.
    pub fn token(&self) -> &str {
        &self.token
    }
}
