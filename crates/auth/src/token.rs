use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque bearer token presented by a bridge installation.
///
/// `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BridgeToken(String);

impl BridgeToken {
    /// Issue a fresh random token: two v4 UUIDs, 64 hex chars, 244 random bits.
    pub fn generate() -> Self {
        let a = Uuid::new_v4().simple().to_string();
        let b = Uuid::new_v4().simple().to_string();
        Self(format!("{a}{b}"))
    }

    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First characters of the token, safe to log.
    pub fn fingerprint(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(6)
            .map(|(i, _)| i)
            .unwrap_or(self.0.len());
        &self.0[..end]
    }
}

impl core::fmt::Debug for BridgeToken {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "BridgeToken({}…)", self.fingerprint())
    }
}
