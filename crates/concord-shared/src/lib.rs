//! # concord-shared
//!
//! Domain models and value types shared by every Concord crate.
//!
//! Everything here is a plain serde-derived value: rows as they travel to
//! and from the remote store, the normalized unordered pair used for
//! friendships and DM threads, and the typed navigation routes the UI
//! layer consumes.

pub mod models;
pub mod pair;
pub mod password;
pub mod routes;

pub use models::*;
pub use pair::DmPair;
pub use routes::Route;
