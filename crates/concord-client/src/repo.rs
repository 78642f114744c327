//! Two-tier data access: the remote store is authoritative, the local
//! cache answers when the remote is unreachable. Every read reports
//! which tier produced it so callers can surface staleness.

use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use concord_remote::{Filter, RemoteStore, TABLE_USERS};
use concord_shared::{normalize_username, UserRecord};
use concord_store::{Cache, StoreError};

use crate::error::{ClientError, Result};

/// Outcome of a tiered read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    /// Fresh row from the remote store.
    Remote(T),
    /// Local copy served because the remote was unreachable or missed.
    Cached(T),
    /// Neither tier had the row.
    Missing,
}

impl<T> Lookup<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            Lookup::Remote(v) | Lookup::Cached(v) => Some(v),
            Lookup::Missing => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Lookup::Missing)
    }
}

/// Shared handle over the remote store and the local cache.
#[derive(Clone)]
pub struct Tiered {
    remote: Arc<dyn RemoteStore>,
    cache: Arc<Mutex<Cache>>,
}

impl Tiered {
    pub fn new(remote: Arc<dyn RemoteStore>, cache: Cache) -> Self {
        Self {
            remote,
            cache: Arc::new(Mutex::new(cache)),
        }
    }

    pub fn remote(&self) -> &Arc<dyn RemoteStore> {
        &self.remote
    }

    /// Runs `f` against the local cache under the connection lock.
    pub fn with_cache<T>(
        &self,
        f: impl FnOnce(&Cache) -> std::result::Result<T, StoreError>,
    ) -> Result<T> {
        let cache = self.cache.lock().map_err(|_| ClientError::CachePoisoned)?;
        f(&cache).map_err(ClientError::from)
    }

    /// Looks a user up by username, remote first, cache second. A remote
    /// hit is mirrored into the cache so the fallback tier stays current.
    pub async fn user_by_username(&self, username: &str) -> Result<Lookup<UserRecord>> {
        let lower = normalize_username(username);
        let filter = Filter::eq("username", &lower);
        match self
            .remote
            .select(TABLE_USERS, Some(&filter), None, Some(1))
            .await
        {
            Ok(rows) => {
                if let Some(row) = rows.into_iter().next() {
                    match serde_json::from_value::<UserRecord>(row) {
                        Ok(user) => {
                            self.with_cache(|c| c.upsert_user(&user))?;
                            return Ok(Lookup::Remote(user));
                        }
                        Err(err) => {
                            warn!(username = %lower, %err, "discarding malformed user row");
                        }
                    }
                }
            }
            Err(err) => {
                warn!(username = %lower, %err, "remote user lookup failed, trying cache");
            }
        }
        let cached = self.with_cache(|c| c.get_user(&lower))?;
        Ok(match cached {
            Some(user) => Lookup::Cached(user),
            None => Lookup::Missing,
        })
    }
}

/// Decodes a batch of rows, dropping any that fail schema validation.
pub(crate) fn decode_rows<T: DeserializeOwned>(rows: Vec<Value>, table: &str) -> Vec<T> {
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        match serde_json::from_value(row) {
            Ok(v) => out.push(v),
            Err(err) => warn!(table, %err, "discarding malformed row"),
        }
    }
    out
}
