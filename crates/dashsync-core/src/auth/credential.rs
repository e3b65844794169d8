use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A bearer credential and when it was obtained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub token: String,
    pub acquired_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            acquired_at: Utc::now(),
        }
    }

    /// Syntactic JWT shape check; the signature is never verified.
    pub fn is_structurally_valid(&self) -> bool {
        is_structurally_valid(&self.token)
    }

    /// Value for the `Authorization` header.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

/// Exactly three non-empty dot-separated segments.
pub fn is_structurally_valid(token: &str) -> bool {
    let mut segments = 0;
    for part in token.split('.') {
        if part.is_empty() {
            return false;
        }
        segments += 1;
    }
    segments == 3
}
