//! Session resolution, login, registration, and logout.
//!
//! There is no in-memory session state: every call takes an explicit
//! [`SessionToken`] and returns an immutable [`UserSnapshot`].  The
//! token is durable only through the cache's session pointer; resolving
//! it re-reads the user row every time.

use serde_json::json;
use tracing::{debug, warn};
use uuid::Uuid;

use concord_remote::{Filter, RemoteError, TABLE_USERS};
use concord_shared::password::verify_hash;
use concord_shared::{normalize_username, Route, UserRecord};

use crate::error::Result;
use crate::repo::{Lookup, Tiered};

/// Opaque handle identifying an authenticated session.
///
/// The legacy session pointer was the bare username; the token keeps
/// that wire value but stops callers from treating it as a user row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(username: &str) -> Self {
        Self(normalize_username(username))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Immutable view of the signed-in user handed to the UI layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSnapshot {
    pub username: String,
    pub display_name: String,
    pub avatar: Option<String>,
    pub uid: Option<String>,
    /// Which tier produced the snapshot; `false` means the cache did.
    pub fresh: bool,
}

impl UserSnapshot {
    fn from_record(user: &UserRecord, fresh: bool) -> Self {
        Self {
            username: user.username.clone(),
            display_name: user.display_name.clone(),
            avatar: user.avatar.clone(),
            uid: user.uid.clone(),
            fresh,
        }
    }
}

/// Outcome of a login attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Success {
        token: SessionToken,
        snapshot: UserSnapshot,
    },
    InvalidPassword,
    UserNotFound,
}

impl LoginOutcome {
    /// The user-facing failure message, if the attempt failed.
    pub fn failure_message(&self) -> Option<&'static str> {
        match self {
            LoginOutcome::Success { .. } => None,
            LoginOutcome::InvalidPassword => Some("Invalid password"),
            LoginOutcome::UserNotFound => Some("User not found"),
        }
    }
}

/// The stored session pointer restored from the cache, if any.
pub fn restore(tiered: &Tiered) -> Result<Option<SessionToken>> {
    Ok(tiered.with_cache(|c| c.session())?.map(SessionToken))
}

/// Resolve a token into the current user snapshot.
///
/// Resolution never hard-fails on remote trouble: a cached copy is
/// served instead, and `None` means neither tier knows the user.
pub async fn resolve(tiered: &Tiered, token: &SessionToken) -> Result<Option<UserSnapshot>> {
    match tiered.user_by_username(token.as_str()).await? {
        Lookup::Remote(user) => {
            let user = ensure_uid(tiered, user).await?;
            mark_online(tiered, &user.username).await;
            Ok(Some(UserSnapshot::from_record(&user, true)))
        }
        Lookup::Cached(user) => {
            let user = ensure_uid(tiered, user).await?;
            Ok(Some(UserSnapshot::from_record(&user, false)))
        }
        Lookup::Missing => Ok(None),
    }
}

/// Validate credentials and establish a session.
///
/// `password_hash` is the client-side digest; the comparison against the
/// stored hash is constant-time.
pub async fn login(tiered: &Tiered, username: &str, password_hash: &str) -> Result<LoginOutcome> {
    let lower = normalize_username(username);
    let lookup = tiered.user_by_username(&lower).await?;
    let (user, fresh) = match lookup {
        Lookup::Remote(u) => (u, true),
        Lookup::Cached(u) => (u, false),
        Lookup::Missing => return Ok(LoginOutcome::UserNotFound),
    };

    if !verify_hash(password_hash, &user.password_hash) {
        return Ok(LoginOutcome::InvalidPassword);
    }

    let mut user = ensure_uid(tiered, user).await?;
    user.online = true;
    tiered.with_cache(|c| c.upsert_user(&user))?;
    tiered.with_cache(|c| c.set_session(&user.username))?;
    if fresh {
        mark_online(tiered, &user.username).await;
    } else {
        // Cache-tier login: push the whole mirrored row back up so the
        // remote catches up once it is reachable again.
        resync_user(tiered, &user).await;
    }

    Ok(LoginOutcome::Success {
        token: SessionToken(user.username.clone()),
        snapshot: UserSnapshot::from_record(&user, fresh),
    })
}

/// Register a new account and establish a session.
///
/// Registration always succeeds locally: the row is written to the cache
/// and the uid map first, then pushed to the remote on a best-effort
/// basis (a lost race on the username upsert is benign).
pub async fn register(
    tiered: &Tiered,
    username: &str,
    display_name: &str,
    password_hash: &str,
) -> Result<(SessionToken, UserSnapshot)> {
    let lower = normalize_username(username);
    let uid = Uuid::new_v4().to_string();
    let user = UserRecord {
        username: lower.clone(),
        display_name: display_name.trim().to_string(),
        password_hash: password_hash.to_string(),
        salt: None,
        avatar: None,
        online: true,
        uid: Some(uid.clone()),
    };

    tiered.with_cache(|c| c.upsert_user(&user))?;
    tiered.with_cache(|c| c.record_uid(&lower, &uid))?;
    tiered.with_cache(|c| c.set_session(&lower))?;

    match tiered
        .remote()
        .upsert(TABLE_USERS, serde_json::to_value(&user)?, "username")
        .await
    {
        Ok(_) => {}
        Err(RemoteError::Conflict(reason)) => {
            debug!(username = %lower, %reason, "registration upsert raced, keeping winner");
        }
        Err(err) => {
            warn!(username = %lower, %err, "registration not yet pushed to remote");
        }
    }

    let snapshot = UserSnapshot::from_record(&user, true);
    Ok((SessionToken(lower), snapshot))
}

/// Tear the session down and report where the UI should go next.
pub async fn logout(tiered: &Tiered, token: &SessionToken) -> Result<Route> {
    tiered.with_cache(|c| c.clear_session())?;
    let patch = json!({ "username": token.as_str(), "online": false });
    if let Err(err) = tiered
        .remote()
        .upsert(TABLE_USERS, patch, "username")
        .await
    {
        warn!(username = %token.as_str(), %err, "offline presence not recorded");
    }
    Ok(Route::Login)
}

/// Backfill a missing uid: prefer the local uid map, else mint one, and
/// record the association plus a best-effort remote patch.
async fn ensure_uid(tiered: &Tiered, mut user: UserRecord) -> Result<UserRecord> {
    if user.uid.is_some() {
        return Ok(user);
    }
    let uid = match tiered.with_cache(|c| c.uid_for(&user.username))? {
        Some(uid) => uid,
        None => Uuid::new_v4().to_string(),
    };
    tiered.with_cache(|c| c.record_uid(&user.username, &uid))?;
    user.uid = Some(uid.clone());
    tiered.with_cache(|c| c.upsert_user(&user))?;

    let filter = Filter::eq("username", &user.username);
    if let Err(err) = tiered
        .remote()
        .update(TABLE_USERS, &filter, json!({ "uid": uid }))
        .await
    {
        warn!(username = %user.username, %err, "uid backfill not yet pushed to remote");
    }
    Ok(user)
}

/// Opportunistic presence write; failures are logged and dropped.
async fn mark_online(tiered: &Tiered, username: &str) {
    let patch = json!({ "username": username, "online": true });
    if let Err(err) = tiered.remote().upsert(TABLE_USERS, patch, "username").await {
        debug!(%username, %err, "presence upsert skipped");
    }
}

/// Push the full mirrored row to the remote after a cache-tier login.
async fn resync_user(tiered: &Tiered, user: &UserRecord) {
    let row = match serde_json::to_value(user) {
        Ok(row) => row,
        Err(_) => return,
    };
    if let Err(err) = tiered.remote().upsert(TABLE_USERS, row, "username").await {
        debug!(username = %user.username, %err, "user resync deferred");
    }
}
