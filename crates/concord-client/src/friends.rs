//! Friend-request resolvers: overview assembly, sending, responding,
//! and blocking.
//!
//! All reads reconcile the remote tables with the locally queued
//! requests the broadcast fallback leaves behind, so the sender's own
//! view stays coherent while the remote is flaky.

use serde_json::json;
use tracing::{debug, warn};
use uuid::Uuid;

use concord_remote::{
    direct_topic, Filter, Order, RemoteError, TABLE_BLOCKED_USERS, TABLE_FRIEND_REQUESTS,
    TABLE_USERS,
};
use concord_shared::{
    normalize_target, BlockedPair, DmPair, FriendRequest, RequestStatus, UserProfile, UserRecord,
};

use crate::error::Result;
use crate::repo::{decode_rows, Tiered};

/// Everything the friends screen renders in one fetch.
#[derive(Debug, Clone, Default)]
pub struct FriendOverview {
    /// All requests involving the viewer: locally queued entries first,
    /// then the fetched rows in remote order.
    pub requests: Vec<FriendRequest>,
    /// Profiles of accepted counterparts, block relations filtered out.
    pub friends: Vec<UserProfile>,
    /// Block rows involving the viewer.
    pub blocked: Vec<BlockedPair>,
}

impl FriendOverview {
    /// Requests still awaiting an answer.
    pub fn pending(&self) -> impl Iterator<Item = &FriendRequest> {
        self.requests
            .iter()
            .filter(|r| r.status == RequestStatus::Pending)
    }
}

/// Outcome of a send-request attempt, with the exact user-facing strings
/// the legacy client showed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Request stored (or queued through the fallback path).
    Sent { to: String, queued: bool },
    UserNotFound,
    SelfAdd,
    AlreadyFriends,
    AlreadyPending,
    Blocked,
    Failed,
}

impl std::fmt::Display for SendOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SendOutcome::Sent { to, .. } => write!(f, "Friend request sent to {to}!"),
            SendOutcome::UserNotFound => write!(f, "User not found. Check spelling!"),
            SendOutcome::SelfAdd => write!(f, "You cannot add yourself."),
            SendOutcome::AlreadyFriends => write!(f, "You are already friends!"),
            SendOutcome::AlreadyPending => write!(f, "Friend request already pending."),
            SendOutcome::Blocked => write!(f, "You cannot add this user."),
            SendOutcome::Failed => write!(f, "Error sending friend request."),
        }
    }
}

/// Answer to a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Decline,
}

impl Decision {
    fn status(self) -> RequestStatus {
        match self {
            Decision::Accept => RequestStatus::Accepted,
            Decision::Decline => RequestStatus::Declined,
        }
    }
}

/// Fetch the full friends state for `me`.
///
/// Remote trouble degrades to the local queue and user mirror instead of
/// failing the whole screen.
pub async fn overview(tiered: &Tiered, me: &str) -> Result<FriendOverview> {
    let involving_me = Filter::or([Filter::eq("from", me), Filter::eq("to", me)]);
    let remote_requests = match tiered
        .remote()
        .select(TABLE_FRIEND_REQUESTS, Some(&involving_me), None, None)
        .await
    {
        Ok(rows) => Some(decode_rows::<FriendRequest>(rows, TABLE_FRIEND_REQUESTS)),
        Err(err) => {
            warn!(%err, "friend request fetch failed, serving local queue");
            None
        }
    };
    let degraded = remote_requests.is_none();
    let mut requests = remote_requests.unwrap_or_default();

    // Queued entries the broadcast fallback left behind win on id so the
    // sender's own view includes writes the remote never saw.
    for queued in tiered.with_cache(|c| c.queued_requests())? {
        if !queued.involves(me) {
            continue;
        }
        if !requests.iter().any(|r| r.id == queued.id) {
            requests.insert(0, queued);
        }
    }

    let blocked = fetch_blocks(tiered, me).await;
    let friend_names: Vec<String> = requests
        .iter()
        .filter(|r| r.status == RequestStatus::Accepted)
        .map(|r| r.counterpart(me).to_string())
        .filter(|name| !blocked.iter().any(|b| b.covers(me, name)))
        .collect();

    let friends = if friend_names.is_empty() {
        Vec::new()
    } else if degraded {
        profiles_from_cache(tiered, &friend_names)?
    } else {
        match tiered
            .remote()
            .select(
                TABLE_USERS,
                Some(&Filter::in_("username", friend_names.iter().cloned())),
                None,
                None,
            )
            .await
        {
            Ok(rows) => decode_rows::<UserRecord>(rows, TABLE_USERS)
                .iter()
                .map(UserProfile::from)
                .collect(),
            Err(err) => {
                warn!(%err, "friend profile fetch failed, serving mirror");
                profiles_from_cache(tiered, &friend_names)?
            }
        }
    };

    Ok(FriendOverview {
        requests,
        friends,
        blocked,
    })
}

/// Resolve `raw_target` and send a friend request from `me`.
pub async fn send_request(tiered: &Tiered, me: &str, raw_target: &str) -> Result<SendOutcome> {
    let normalized = normalize_target(raw_target);
    if normalized.is_empty() {
        return Ok(SendOutcome::UserNotFound);
    }

    let target = match resolve_target(tiered, &normalized).await? {
        Some(profile) => profile,
        None => return Ok(SendOutcome::UserNotFound),
    };
    if target.username == me {
        return Ok(SendOutcome::SelfAdd);
    }

    let blocks = fetch_blocks(tiered, me).await;
    if blocks.iter().any(|b| b.covers(me, &target.username)) {
        return Ok(SendOutcome::Blocked);
    }

    let pair = Filter::unordered_pair("from", "to", me, &target.username);
    let mut pair_status_known = false;
    match tiered
        .remote()
        .select(TABLE_FRIEND_REQUESTS, Some(&pair), None, Some(1))
        .await
    {
        Ok(rows) => {
            pair_status_known = true;
            if let Some(existing) = decode_rows::<FriendRequest>(rows, TABLE_FRIEND_REQUESTS)
                .into_iter()
                .next()
            {
                match existing.status {
                    RequestStatus::Accepted => return Ok(SendOutcome::AlreadyFriends),
                    RequestStatus::Pending => return Ok(SendOutcome::AlreadyPending),
                    // A declined row gets replaced by the upsert below.
                    RequestStatus::Declined => {}
                }
            }
        }
        Err(err) => {
            debug!(%err, "duplicate check failed, falling back to a conflict-rejecting insert");
        }
    }

    let request = FriendRequest::pending(me, &target.username);
    let row = serde_json::to_value(&request)?;
    let write = if pair_status_known {
        tiered
            .remote()
            .upsert(TABLE_FRIEND_REQUESTS, row.clone(), "pair_key")
            .await
    } else {
        // Without the pre-check the pair's current status is unknown; a
        // merge could overwrite an accepted row. Let the unique key
        // reject instead.
        match tiered.remote().insert(TABLE_FRIEND_REQUESTS, row.clone()).await {
            Err(RemoteError::Conflict(_)) => return Ok(SendOutcome::AlreadyPending),
            other => other,
        }
    };
    match write {
        Ok(_) => Ok(SendOutcome::Sent {
            to: target.display_name,
            queued: false,
        }),
        Err(err) => {
            warn!(%err, to = %target.username, "request write failed, broadcasting instead");
            if let Err(err) = tiered
                .remote()
                .publish_direct(&direct_topic(&target.username), row)
                .await
            {
                debug!(%err, "direct broadcast also failed");
            }
            match tiered.with_cache(|c| c.queue_request(&request)) {
                Ok(()) => Ok(SendOutcome::Sent {
                    to: target.display_name,
                    queued: true,
                }),
                Err(err) => {
                    warn!(%err, "local queue write failed");
                    Ok(SendOutcome::Failed)
                }
            }
        }
    }
}

/// Answer a pending request and return the refreshed overview.
pub async fn respond(
    tiered: &Tiered,
    me: &str,
    id: Uuid,
    decision: Decision,
) -> Result<FriendOverview> {
    let status = decision.status();
    let by_id = Filter::eq("id", id.to_string());
    let patch = json!({ "status": status });
    match tiered
        .remote()
        .update(TABLE_FRIEND_REQUESTS, &by_id, patch)
        .await
    {
        Ok(rows) => {
            match decode_rows::<FriendRequest>(rows, TABLE_FRIEND_REQUESTS)
                .into_iter()
                .next()
            {
                Some(updated) => {
                    // The queued copy is redundant once the remote row
                    // carries the answer.
                    tiered.with_cache(|c| c.remove_queued(id))?;
                    broadcast_response(tiered, me, &updated).await?;
                }
                // Zero matches: the request only ever reached the local
                // queue through the broadcast fallback. Answer it there
                // and push the resulting row up so both sides converge.
                None => answer_queued(tiered, me, id, status).await?,
            }
        }
        Err(err) => {
            warn!(%err, %id, "response not yet pushed to remote");
            // Keep the local queue honest so the answered request stops
            // showing as pending.
            let queued = tiered.with_cache(|c| c.queued_requests())?;
            if let Some(mut req) = queued.into_iter().find(|r| r.id == id) {
                req.status = status;
                tiered.with_cache(|c| c.queue_request(&req))?;
            }
        }
    }
    overview(tiered, me).await
}

/// Let the other side repaint without waiting for CDC.
async fn broadcast_response(tiered: &Tiered, me: &str, updated: &FriendRequest) -> Result<()> {
    let topic = direct_topic(updated.counterpart(me));
    if let Err(err) = tiered
        .remote()
        .publish_direct(&topic, serde_json::to_value(updated)?)
        .await
    {
        debug!(%err, "response broadcast skipped");
    }
    Ok(())
}

/// Answer a request that exists only in the local queue: flip its status
/// in place, then try to materialize the row remotely. The queue entry
/// is dropped only once the remote holds the answered row.
async fn answer_queued(tiered: &Tiered, me: &str, id: Uuid, status: RequestStatus) -> Result<()> {
    let queued = tiered.with_cache(|c| c.queued_requests())?;
    let Some(mut req) = queued.into_iter().find(|r| r.id == id) else {
        warn!(%id, "answered request matched neither remote rows nor the queue");
        return Ok(());
    };
    req.status = status;
    tiered.with_cache(|c| c.queue_request(&req))?;

    match tiered
        .remote()
        .upsert(
            TABLE_FRIEND_REQUESTS,
            serde_json::to_value(&req)?,
            "pair_key",
        )
        .await
    {
        Ok(_) => {
            tiered.with_cache(|c| c.remove_queued(id))?;
            broadcast_response(tiered, me, &req).await?;
        }
        Err(err) => {
            warn!(%err, %id, "answered queue entry not yet pushed to remote");
        }
    }
    Ok(())
}

/// Block `other`: record the relation, drop any request rows between the
/// pair, and return the refreshed overview.
pub async fn block(tiered: &Tiered, me: &str, other: &str) -> Result<FriendOverview> {
    let row = serde_json::to_value(BlockedPair {
        blocker: me.to_string(),
        blocked: other.to_string(),
    })?;
    if let Err(err) = tiered.remote().insert(TABLE_BLOCKED_USERS, row).await {
        warn!(%err, %other, "block row not yet pushed to remote");
    }

    let pair = Filter::unordered_pair("from", "to", me, other);
    if let Err(err) = tiered.remote().delete(TABLE_FRIEND_REQUESTS, &pair).await {
        debug!(%err, "stale request rows not purged");
    }

    let pair_key = DmPair::new(me, other).key();
    for queued in tiered.with_cache(|c| c.queued_requests())? {
        if queued.pair_key == pair_key {
            tiered.with_cache(|c| c.remove_queued(queued.id))?;
        }
    }
    overview(tiered, me).await
}

/// Resolve an add-friend target: exact username, stable uid, fuzzy name
/// match, then the local identifier map.
async fn resolve_target(tiered: &Tiered, normalized: &str) -> Result<Option<UserProfile>> {
    let remote = tiered.remote();

    let exact = Filter::eq("username", normalized);
    if let Ok(rows) = remote.select(TABLE_USERS, Some(&exact), None, Some(1)).await {
        if let Some(user) = decode_rows::<UserRecord>(rows, TABLE_USERS).into_iter().next() {
            return Ok(Some(UserProfile::from(&user)));
        }
    }

    let by_uid = Filter::eq("uid", normalized);
    if let Ok(rows) = remote
        .select(TABLE_USERS, Some(&by_uid), None, Some(1))
        .await
    {
        if let Some(user) = decode_rows::<UserRecord>(rows, TABLE_USERS).into_iter().next() {
            return Ok(Some(UserProfile::from(&user)));
        }
    }

    let fuzzy = Filter::or([
        Filter::ilike("username", format!("%{normalized}%")),
        Filter::ilike("displayName", format!("%{normalized}%")),
    ]);
    if let Ok(rows) = remote
        .select(TABLE_USERS, Some(&fuzzy), Some(&Order::asc("username")), Some(10))
        .await
    {
        let candidates = decode_rows::<UserRecord>(rows, TABLE_USERS);
        // An exact lowercase hit among the candidates beats the first
        // substring match.
        let best = candidates
            .iter()
            .find(|u| u.username == normalized)
            .or_else(|| candidates.first());
        if let Some(user) = best {
            return Ok(Some(UserProfile::from(user)));
        }
    }

    if let Some(username) = tiered.with_cache(|c| c.username_for_uid(normalized))? {
        if let Some(user) = tiered.user_by_username(&username).await?.into_option() {
            return Ok(Some(UserProfile::from(&user)));
        }
    }

    Ok(tiered
        .with_cache(|c| c.get_user(normalized))?
        .map(|u| UserProfile::from(&u)))
}

/// Block rows involving `me`; remote trouble reads as "no blocks".
async fn fetch_blocks(tiered: &Tiered, me: &str) -> Vec<BlockedPair> {
    let filter = Filter::or([Filter::eq("blocker", me), Filter::eq("blocked", me)]);
    match tiered
        .remote()
        .select(TABLE_BLOCKED_USERS, Some(&filter), None, None)
        .await
    {
        Ok(rows) => decode_rows(rows, TABLE_BLOCKED_USERS),
        Err(err) => {
            debug!(%err, "block list fetch failed");
            Vec::new()
        }
    }
}

/// Build friend profiles from the local user mirror, synthesizing a
/// display name for users the mirror has never seen.
fn profiles_from_cache(tiered: &Tiered, names: &[String]) -> Result<Vec<UserProfile>> {
    let mut out = Vec::with_capacity(names.len());
    for name in names {
        let profile = match tiered.with_cache(|c| c.get_user(name))? {
            Some(user) => UserProfile::from(&user),
            None => UserProfile {
                username: name.clone(),
                display_name: name.clone(),
            },
        };
        out.push(profile);
    }
    Ok(out)
}
