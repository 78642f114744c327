//! Cache connection management.
//!
//! The [`Cache`] struct owns a [`rusqlite::Connection`] and guarantees
//! that migrations are run before any other operation.  Reads re-parse
//! the stored JSON on every call; there is no in-memory layer and no
//! cross-process coordination (single writer assumed).

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Result, StoreError};
use crate::migrations;

/// Wrapper around a [`rusqlite::Connection`] holding the local mirror.
pub struct Cache {
    conn: Connection,
}

impl Cache {
    /// Open (or create) the default application cache.
    ///
    /// The database file is placed in the platform-appropriate data
    /// directory, e.g. `~/.local/share/concord/cache.db` on Linux.
    pub fn open() -> Result<Self> {
        let project_dirs =
            ProjectDirs::from("com", "concord", "concord").ok_or(StoreError::NoDataDir)?;

        let data_dir = project_dirs.data_dir();
        std::fs::create_dir_all(data_dir)?;

        let db_path = data_dir.join("cache.db");

        tracing::info!(path = %db_path.display(), "opening local cache");

        Self::open_at(&db_path)
    }

    /// Open (or create) a cache at an explicit path.
    ///
    /// This is useful for tests and for embedding the cache inside custom
    /// directory layouts.
    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        conn.pragma_update(None, "journal_mode", "WAL")?;

        migrations::run_migrations(&conn)?;

        Ok(Self { conn })
    }

    /// Return the filesystem path of the open cache (if any).
    pub fn path(&self) -> Option<PathBuf> {
        self.conn.path().map(PathBuf::from)
    }

    // ------------------------------------------------------------------
    // JSON document access
    // ------------------------------------------------------------------

    /// Read and decode the document stored under `key`.
    ///
    /// Missing keys yield `Ok(None)`; a document that no longer parses is
    /// reported as [`StoreError::CorruptEntry`] rather than treated as
    /// absent.
    pub(crate) fn get_json<T: DeserializeOwned>(&self, key: &'static str) -> Result<Option<T>> {
        let raw: Option<String> = self
            .conn
            .query_row("SELECT value FROM cache WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;

        match raw {
            None => Ok(None),
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|source| StoreError::CorruptEntry { key, source }),
        }
    }

    /// Encode and store `value` under `key`, replacing any previous
    /// document.
    pub(crate) fn put_json<T: Serialize>(&self, key: &'static str, value: &T) -> Result<()> {
        let json = serde_json::to_string(value)
            .map_err(|source| StoreError::CorruptEntry { key, source })?;
        self.conn.execute(
            "INSERT OR REPLACE INTO cache (key, value) VALUES (?1, ?2)",
            params![key, json],
        )?;
        Ok(())
    }

    /// Remove the document stored under `key`.  Returns `true` if a row
    /// was deleted.
    pub(crate) fn remove(&self, key: &'static str) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM cache WHERE key = ?1", params![key])?;
        Ok(affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");

        let cache = Cache::open_at(&path).expect("should open");
        assert!(cache.path().is_some());
    }

    #[test]
    fn json_documents_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::open_at(&dir.path().join("t.db")).unwrap();

        assert!(cache.get_json::<String>("dc_current_user").unwrap().is_none());
        cache.put_json("dc_current_user", &"alice".to_string()).unwrap();
        assert_eq!(
            cache.get_json::<String>("dc_current_user").unwrap().as_deref(),
            Some("alice")
        );
        assert!(cache.remove("dc_current_user").unwrap());
        assert!(cache.get_json::<String>("dc_current_user").unwrap().is_none());
    }
}
