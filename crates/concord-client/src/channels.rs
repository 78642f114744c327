//! Server channel navigation.
//!
//! Channel lists are purely local state; the only resolver logic is
//! picking the default (first-created) channel for a server.

use concord_shared::Route;

use crate::error::Result;
use crate::repo::Tiered;

/// The route for a server's default channel, or `None` when the server
/// has no locally known channels.
pub fn default_channel_route(tiered: &Tiered, server_id: &str) -> Result<Option<Route>> {
    let channel = tiered.with_cache(|c| c.default_channel(server_id))?;
    Ok(channel.map(|ch| Route::ServerChannel {
        server: server_id.to_string(),
        channel: ch.id,
    }))
}
