//! Typed navigation targets.
//!
//! The resolvers return these instead of performing navigation side
//! effects; the UI layer renders them into client-side paths.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A client-side navigation target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Route {
    /// A channel inside a server: `/channels/<server>/<channel>`.
    ServerChannel { server: String, channel: String },
    /// A DM thread: `/channels/me/<dmId>`.
    DmThread { dm_id: Uuid },
    /// The login page, navigated to on logout.
    Login,
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Route::ServerChannel { server, channel } => {
                write!(f, "/channels/{server}/{channel}")
            }
            Route::DmThread { dm_id } => write!(f, "/channels/me/{dm_id}"),
            Route::Login => write!(f, "/login"),
        }
    }
}
