//! Shared primitive IDs and ranks.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Store-assigned todo identifier. Never reused within one store lineage.
pub type TodoId = u64;
/// Monotonic operation sequence number.
pub type OpSeq = u64;
/// Advisory display rank. May go negative when items are prepended.
pub type Rank = i64;

/// Opaque identifier handed out by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Wraps a provider-issued identifier.
    pub fn new(uid: impl Into<String>) -> Self {
        Self(uid.into())
    }

    /// Returns the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for UserId {
    fn from(value: String) -> Self {
        Self(value)
    }
}
