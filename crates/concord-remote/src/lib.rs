//! # concord-remote
//!
//! Client for the hosted relational store Concord delegates durability,
//! querying, and change notification to.
//!
//! The crate exposes a table-oriented [`RemoteStore`] trait with
//! `eq`/`ilike`/`in`/`and`/`or` filter composition, change-data-capture
//! subscriptions per table, and named point-to-point broadcast topics.
//! Two backends implement it: [`HttpRemote`] speaks the service's REST
//! and realtime-websocket protocols, and [`MemoryRemote`] is an
//! in-process stand-in for tests and degraded operation.

pub mod config;
pub mod filter;
pub mod http;
pub mod hub;
pub mod memory;
pub mod socket;
pub mod store;

mod error;

pub use config::RemoteConfig;
pub use error::RemoteError;
pub use filter::{Filter, Order};
pub use http::HttpRemote;
pub use memory::MemoryRemote;
pub use store::{
    direct_topic, ChangeAction, ChangeEvent, RemoteStore, TABLE_BLOCKED_USERS, TABLE_DMS,
    TABLE_DM_MESSAGES, TABLE_FRIEND_REQUESTS, TABLE_USERS,
};
