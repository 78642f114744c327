//! v001 -- Initial schema creation.
//!
//! One key/value table of JSON documents.  The keys are the legacy
//! browser-storage keys the old web client used, so a cache exported from
//! it maps one-to-one.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS cache (
    key   TEXT PRIMARY KEY NOT NULL,   -- legacy storage key (dc_*)
    value TEXT NOT NULL                -- JSON document
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
