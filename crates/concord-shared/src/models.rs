//! Domain model structs exchanged with the remote store.
//!
//! Field names follow the remote table columns exactly (including the
//! camel-cased user columns the legacy web client created), so every
//! struct round-trips through `serde_json::Value` without a mapping
//! layer.  Rows coming off the wire are decoded into these structs at the
//! crate boundary; nothing downstream touches raw JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pair::DmPair;

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A registered user.  The primary key is the lowercase username.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserRecord {
    /// Unique, lowercase-normalized login name.
    pub username: String,
    /// Human-readable display name.
    #[serde(rename = "displayName")]
    pub display_name: String,
    /// Client-supplied password hash (see [`crate::password`]).
    #[serde(rename = "passwordHash")]
    pub password_hash: String,
    /// Optional salt used when the hash was produced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<String>,
    /// Optional avatar reference.
    #[serde(default)]
    pub avatar: Option<String>,
    /// Presence flag, opportunistically upserted on session resolution.
    #[serde(default)]
    pub online: bool,
    /// Opaque stable identifier, backfilled lazily for legacy rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}

/// The subset of a user row other people are allowed to see.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserProfile {
    pub username: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
}

impl From<&UserRecord> for UserProfile {
    fn from(u: &UserRecord) -> Self {
        Self {
            username: u.username.clone(),
            display_name: u.display_name.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Friend requests
// ---------------------------------------------------------------------------

/// Lifecycle of a friend request row.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Declined,
}

/// A friend request between two users.
///
/// `pair_key` is the normalized unordered pair of the two usernames; the
/// storage layer enforces at most one active row per pair through it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FriendRequest {
    pub id: Uuid,
    pub pair_key: String,
    pub from: String,
    pub to: String,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
}

impl FriendRequest {
    /// Build a fresh pending request from `from` to `to`.
    pub fn pending(from: &str, to: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            pair_key: DmPair::new(from, to).key(),
            from: from.to_string(),
            to: to.to_string(),
            status: RequestStatus::Pending,
            created_at: Utc::now(),
        }
    }

    /// The side of the request that is not `me`.
    pub fn counterpart(&self, me: &str) -> &str {
        if self.from == me {
            &self.to
        } else {
            &self.from
        }
    }

    /// Whether `user` is one of the two sides.
    pub fn involves(&self, user: &str) -> bool {
        self.from == user || self.to == user
    }
}

// ---------------------------------------------------------------------------
// Blocks
// ---------------------------------------------------------------------------

/// A block relation.  Presence suppresses friend and DM interaction in
/// both directions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockedPair {
    pub blocker: String,
    pub blocked: String,
}

impl BlockedPair {
    /// Whether this row blocks interaction between `a` and `b` (either
    /// orientation).
    pub fn covers(&self, a: &str, b: &str) -> bool {
        (self.blocker == a && self.blocked == b) || (self.blocker == b && self.blocked == a)
    }
}

// ---------------------------------------------------------------------------
// Direct messages
// ---------------------------------------------------------------------------

/// A DM thread, created lazily on first navigation between two users.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DmThread {
    pub id: Uuid,
    pub pair_key: String,
    pub pair_a: String,
    pub pair_b: String,
    /// Username of whoever created the thread.
    pub user: String,
    pub created_at: DateTime<Utc>,
}

impl DmThread {
    /// Build a new thread between `creator` and `other` with a normalized
    /// pair.
    pub fn between(creator: &str, other: &str) -> Self {
        let pair = DmPair::new(creator, other);
        Self {
            id: Uuid::new_v4(),
            pair_key: pair.key(),
            pair_a: pair.first().to_string(),
            pair_b: pair.second().to_string(),
            user: creator.to_string(),
            created_at: Utc::now(),
        }
    }
}

/// A single message inside a DM thread, keyed by the normalized pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DmMessage {
    pub pair_a: String,
    pub pair_b: String,
    /// Sender username.
    pub user: String,
    pub text: String,
    pub time: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Channels
// ---------------------------------------------------------------------------

/// A locally known channel inside a server; the first-created channel per
/// server is the default navigation target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LocalChannel {
    pub id: String,
    pub server_id: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Normalize a login identifier: trim and lowercase.
pub fn normalize_username(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Normalize an add-friend target: trim, strip one leading `@`, lowercase.
pub fn normalize_target(raw: &str) -> String {
    let t = raw.trim();
    let t = t.strip_prefix('@').unwrap_or(t);
    t.to_lowercase()
}
