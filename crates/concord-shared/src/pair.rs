//! Unordered username pairs.
//!
//! Friendships and DM threads are relationships between two users with no
//! inherent direction.  `DmPair` sorts the two names so every such
//! relationship has exactly one canonical form regardless of who
//! initiated it, and `key()` yields the string the storage layer uses as
//! its uniqueness key.

use serde::{Deserialize, Serialize};

/// A normalized (lexicographically sorted) pair of usernames.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct DmPair {
    a: String,
    b: String,
}

impl DmPair {
    /// Normalize `(x, y)` by sort order; `new(a, b) == new(b, a)`.
    pub fn new(x: &str, y: &str) -> Self {
        if x <= y {
            Self {
                a: x.to_string(),
                b: y.to_string(),
            }
        } else {
            Self {
                a: y.to_string(),
                b: x.to_string(),
            }
        }
    }

    /// The lexicographically smaller side.
    pub fn first(&self) -> &str {
        &self.a
    }

    /// The lexicographically larger side.
    pub fn second(&self) -> &str {
        &self.b
    }

    /// Canonical storage key for the pair.
    pub fn key(&self) -> String {
        format!("{}:{}", self.a, self.b)
    }

    /// The side that is not `me`, or `None` if `me` is not part of the
    /// pair.
    pub fn other(&self, me: &str) -> Option<&str> {
        if self.a == me {
            Some(&self.b)
        } else if self.b == me {
            Some(&self.a)
        } else {
            None
        }
    }
}

impl std::fmt::Display for DmPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.a, self.b)
    }
}
