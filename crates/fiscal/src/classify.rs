//! Permanent vs transient classification of fiscal errors.
//!
//! Classification is a phrase match on the error text reported by the bridge,
//! independent of the remaining retry budget: a duplicate document stays a
//! duplicate no matter how many attempts are left.

use serde::{Deserialize, Serialize};

/// Phrases the fiscal authority / printer use for rejections retrying cannot fix.
pub const DEFAULT_NON_RETRIABLE_PATTERNS: &[&str] = &[
    "duplicate fiscal document",
    "duplicate document",
    "document already exists",
    "already fiscalized",
    "rejected by fiscal authority",
    "fiscal memory full",
    "fiscal memory is full",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Printer offline, paper out, network blip: worth retrying.
    Transient,
    /// Hard rejection: the job must terminate.
    Permanent,
}

impl FailureKind {
    pub fn is_retriable(&self) -> bool {
        matches!(self, FailureKind::Transient)
    }
}

/// Case-insensitive substring matcher over known permanent-failure phrases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureClassifier {
    patterns: Vec<String>,
}

impl Default for FailureClassifier {
    fn default() -> Self {
        Self {
            patterns: DEFAULT_NON_RETRIABLE_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }
}

impl FailureClassifier {
    /// Classifier with no permanent phrases (everything is transient).
    pub fn empty() -> Self {
        Self {
            patterns: Vec::new(),
        }
    }

    /// Add a permanent-failure phrase.
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        let pattern = pattern.into().trim().to_lowercase();
        if !pattern.is_empty() && !self.patterns.contains(&pattern) {
            self.patterns.push(pattern);
        }
        self
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn classify(&self, error: &str) -> FailureKind {
        let error = error.to_lowercase();
        if self.patterns.iter().any(|p| error.contains(p.as_str())) {
            FailureKind::Permanent
        } else {
            FailureKind::Transient
        }
    }
}
