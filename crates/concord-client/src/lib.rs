//! # concord-client
//!
//! Application-side resolvers for Concord: session handling, friend
//! requests, direct messages, and channel navigation, all built on a
//! two-tier repository that prefers the remote store and degrades to
//! the local cache.

pub mod channels;
pub mod dms;
pub mod friends;
pub mod listener;
pub mod repo;
pub mod session;

mod error;

pub use error::ClientError;
pub use listener::{ChangeListener, Refresh};
pub use repo::{Lookup, Tiered};
pub use session::{LoginOutcome, SessionToken, UserSnapshot};
