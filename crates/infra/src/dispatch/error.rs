use fiscalbridge_core::DomainError;

use crate::credentials::CredentialStoreError;
use crate::jobs::JobStoreError;
use crate::printers::ConfigStoreError;

/// Error surfaced by the dispatch service to the HTTP layer.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DispatchError {
    /// Unknown or revoked bridge token. Deliberately carries no detail.
    #[error("invalid or revoked token")]
    Unauthorized,

    /// Missing, foreign, or already terminal resource.
    #[error("{0}")]
    NotFound(String),

    /// Rejected input; `field` names the offending request field when known.
    #[error("{message}")]
    Validation {
        field: Option<String>,
        message: String,
    },

    #[error("store error: {0}")]
    Store(String),
}

impl DispatchError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: Some(field.into()),
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            field: None,
            message: message.into(),
        }
    }
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => Self::validation(msg),
            DomainError::InvariantViolation(msg) => Self::validation(msg),
            DomainError::NotFound => Self::not_found("not found"),
            // Terminal jobs are invisible to the protocol: they answer like missing ones.
            DomainError::Terminal(msg) => Self::NotFound(msg),
        }
    }
}

impl From<JobStoreError> for DispatchError {
    fn from(value: JobStoreError) -> Self {
        match value {
            JobStoreError::NotFound(id) => Self::not_found(format!("job {id} not found")),
            JobStoreError::Domain(err) => err.into(),
            JobStoreError::AlreadyExists(id) => Self::Store(format!("job {id} already exists")),
            JobStoreError::Storage(msg) => Self::Store(msg),
        }
    }
}

impl From<CredentialStoreError> for DispatchError {
    fn from(value: CredentialStoreError) -> Self {
        Self::Store(value.to_string())
    }
}

impl From<ConfigStoreError> for DispatchError {
    fn from(value: ConfigStoreError) -> Self {
        Self::Store(value.to_string())
    }
}
