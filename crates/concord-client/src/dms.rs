//! Direct-message resolvers.
//!
//! Threads are created lazily: navigating to a DM finds or creates the
//! single thread row for the normalized pair, then returns the typed
//! route for it.  Messages are keyed by the pair columns rather than the
//! thread id, matching the legacy table layout.

use chrono::Utc;
use tracing::warn;

use concord_remote::{Filter, Order, RemoteError, TABLE_DMS, TABLE_DM_MESSAGES};
use concord_shared::{DmMessage, DmPair, DmThread, Route};

use crate::error::Result;
use crate::repo::{decode_rows, Tiered};

/// Find or create the thread between `me` and `friend` and return its
/// navigation route.
///
/// Creation races resolve to the first writer: the pair key is unique,
/// so a conflicting insert re-reads the surviving row.
pub async fn open_thread(tiered: &Tiered, me: &str, friend: &str) -> Result<Route> {
    if let Some(existing) = find_thread(tiered, me, friend).await? {
        return Ok(Route::DmThread { dm_id: existing.id });
    }

    let thread = DmThread::between(me, friend);
    match tiered
        .remote()
        .insert(TABLE_DMS, serde_json::to_value(&thread)?)
        .await
    {
        Ok(row) => {
            let stored: DmThread = serde_json::from_value(row)?;
            Ok(Route::DmThread { dm_id: stored.id })
        }
        Err(RemoteError::Conflict(_)) => {
            let winner = find_thread(tiered, me, friend)
                .await?
                .ok_or(RemoteError::Conflict("dm thread vanished after race".into()))?;
            Ok(Route::DmThread { dm_id: winner.id })
        }
        Err(err) => Err(err.into()),
    }
}

/// All messages between the pair, oldest first.  Rows that fail schema
/// validation are dropped rather than poisoning the whole thread.
pub async fn load_messages(tiered: &Tiered, me: &str, friend: &str) -> Result<Vec<DmMessage>> {
    let pair = Filter::unordered_pair("pair_a", "pair_b", me, friend);
    let rows = tiered
        .remote()
        .select(
            TABLE_DM_MESSAGES,
            Some(&pair),
            Some(&Order::asc("time")),
            None,
        )
        .await?;
    Ok(decode_rows(rows, TABLE_DM_MESSAGES))
}

/// Append a message from `me` to `friend`.
pub async fn send_message(tiered: &Tiered, me: &str, friend: &str, text: &str) -> Result<DmMessage> {
    let pair = DmPair::new(me, friend);
    let message = DmMessage {
        pair_a: pair.first().to_string(),
        pair_b: pair.second().to_string(),
        user: me.to_string(),
        text: text.to_string(),
        time: Utc::now(),
    };
    let row = tiered
        .remote()
        .insert(TABLE_DM_MESSAGES, serde_json::to_value(&message)?)
        .await?;
    Ok(serde_json::from_value(row)?)
}

async fn find_thread(tiered: &Tiered, me: &str, friend: &str) -> Result<Option<DmThread>> {
    let pair = Filter::unordered_pair("pair_a", "pair_b", me, friend);
    match tiered
        .remote()
        .select(TABLE_DMS, Some(&pair), None, Some(1))
        .await
    {
        Ok(rows) => Ok(decode_rows::<DmThread>(rows, TABLE_DMS).into_iter().next()),
        Err(err) => {
            warn!(%err, "dm thread lookup failed");
            Err(err.into())
        }
    }
}
