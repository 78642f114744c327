//! # concord-store
//!
//! Local cache for the Concord client, backed by SQLite.
//!
//! The remote store is the system of record; this crate holds the
//! best-effort, non-authoritative mirror the client falls back to when
//! the remote is unreachable, plus the legacy bootstrap data the old web
//! client kept in browser storage.  The cache is a single key/value table
//! of JSON documents so the legacy storage keys survive verbatim, with a
//! typed accessor per key.

pub mod cache;
pub mod keys;
pub mod migrations;

mod error;

pub use cache::Cache;
pub use error::StoreError;
