//! Typed accessors for the legacy cache keys.
//!
//! Each key holds one JSON document with the exact shape the old web
//! client kept in browser storage:
//!
//! - `dc_current_user`    -- session pointer (plain username string)
//! - `dc_users`           -- map lowercase-username -> user record
//! - `dc_uid_map`         -- map holding both `username -> uid` and
//!   `uid -> username` entries under one key
//! - `dc_local_channels`  -- map server-id -> channel list
//! - `dc_friend_requests` -- pending queue fed by the broadcast fallback

use std::collections::HashMap;

use uuid::Uuid;

use concord_shared::{FriendRequest, LocalChannel, UserRecord};

use crate::cache::Cache;
use crate::error::Result;

pub const KEY_CURRENT_USER: &str = "dc_current_user";
pub const KEY_USERS: &str = "dc_users";
pub const KEY_UID_MAP: &str = "dc_uid_map";
pub const KEY_LOCAL_CHANNELS: &str = "dc_local_channels";
pub const KEY_FRIEND_REQUESTS: &str = "dc_friend_requests";

impl Cache {
    // ------------------------------------------------------------------
    // Session pointer
    // ------------------------------------------------------------------

    /// The stored session pointer (username), if a session exists.
    pub fn session(&self) -> Result<Option<String>> {
        self.get_json(KEY_CURRENT_USER)
    }

    /// Persist the session pointer.
    pub fn set_session(&self, username: &str) -> Result<()> {
        self.put_json(KEY_CURRENT_USER, &username)
    }

    /// Clear the session pointer.  Returns `true` if one was set.
    pub fn clear_session(&self) -> Result<bool> {
        self.remove(KEY_CURRENT_USER)
    }

    // ------------------------------------------------------------------
    // User mirror
    // ------------------------------------------------------------------

    /// The full locally mirrored user map.
    pub fn users(&self) -> Result<HashMap<String, UserRecord>> {
        Ok(self.get_json(KEY_USERS)?.unwrap_or_default())
    }

    /// Look up a mirrored user by lowercase username.
    pub fn get_user(&self, username: &str) -> Result<Option<UserRecord>> {
        Ok(self.users()?.remove(username))
    }

    /// Insert or replace a mirrored user, keyed by lowercase username.
    pub fn upsert_user(&self, user: &UserRecord) -> Result<()> {
        let mut users = self.users()?;
        users.insert(user.username.to_lowercase(), user.clone());
        self.put_json(KEY_USERS, &users)
    }

    // ------------------------------------------------------------------
    // Uid map
    // ------------------------------------------------------------------

    /// The stable identifier recorded for `username`, if any.
    pub fn uid_for(&self, username: &str) -> Result<Option<String>> {
        let map: HashMap<String, String> = self.get_json(KEY_UID_MAP)?.unwrap_or_default();
        Ok(map.get(username).cloned())
    }

    /// Reverse lookup: the username a uid was recorded for.
    ///
    /// The legacy client stored both orientations under the same key, so
    /// this is just a map read as well.
    pub fn username_for_uid(&self, uid: &str) -> Result<Option<String>> {
        let map: HashMap<String, String> = self.get_json(KEY_UID_MAP)?.unwrap_or_default();
        Ok(map.get(uid).cloned())
    }

    /// Record a `username <-> uid` association in both directions.
    pub fn record_uid(&self, username: &str, uid: &str) -> Result<()> {
        let mut map: HashMap<String, String> = self.get_json(KEY_UID_MAP)?.unwrap_or_default();
        map.insert(username.to_string(), uid.to_string());
        map.insert(uid.to_string(), username.to_string());
        self.put_json(KEY_UID_MAP, &map)
    }

    // ------------------------------------------------------------------
    // Local channels
    // ------------------------------------------------------------------

    /// Channels locally known for `server_id`, in creation order.
    pub fn channels_for_server(&self, server_id: &str) -> Result<Vec<LocalChannel>> {
        let map: HashMap<String, Vec<LocalChannel>> =
            self.get_json(KEY_LOCAL_CHANNELS)?.unwrap_or_default();
        Ok(map.get(server_id).cloned().unwrap_or_default())
    }

    /// The default navigation target for a server: its first-created
    /// channel.
    pub fn default_channel(&self, server_id: &str) -> Result<Option<LocalChannel>> {
        Ok(self.channels_for_server(server_id)?.into_iter().next())
    }

    /// Replace the channel list for `server_id`.
    pub fn set_channels(&self, server_id: &str, channels: &[LocalChannel]) -> Result<()> {
        let mut map: HashMap<String, Vec<LocalChannel>> =
            self.get_json(KEY_LOCAL_CHANNELS)?.unwrap_or_default();
        map.insert(server_id.to_string(), channels.to_vec());
        self.put_json(KEY_LOCAL_CHANNELS, &map)
    }

    // ------------------------------------------------------------------
    // Pending friend-request queue
    // ------------------------------------------------------------------

    /// The locally queued friend requests (broadcast-fallback path).
    pub fn queued_requests(&self) -> Result<Vec<FriendRequest>> {
        Ok(self.get_json(KEY_FRIEND_REQUESTS)?.unwrap_or_default())
    }

    /// Merge a request into the queue, upsert-by-id: replace the entry
    /// with a matching id, else prepend.
    pub fn queue_request(&self, request: &FriendRequest) -> Result<()> {
        let mut queue = self.queued_requests()?;
        if let Some(existing) = queue.iter_mut().find(|r| r.id == request.id) {
            *existing = request.clone();
        } else {
            queue.insert(0, request.clone());
        }
        self.put_json(KEY_FRIEND_REQUESTS, &queue)
    }

    /// Drop a queued request by id.  Returns `true` if one was removed.
    pub fn remove_queued(&self, id: Uuid) -> Result<bool> {
        let mut queue = self.queued_requests()?;
        let before = queue.len();
        queue.retain(|r| r.id != id);
        let removed = queue.len() != before;
        if removed {
            self.put_json(KEY_FRIEND_REQUESTS, &queue)?;
        }
        Ok(removed)
    }
}
