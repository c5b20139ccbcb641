//! Database schema and migrations

use rusqlite::Connection;

use crate::Result;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
///
/// # Errors
///
/// Returns error if migration fails
pub fn init(conn: &Connection) -> Result<()> {
    let version: i32 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .unwrap_or(0);

    if version < 1 {
        migrate_v1(conn)?;
    }

    Ok(())
}

fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r"
        -- Track announcements and favorites, one collection per extension
        CREATE TABLE IF NOT EXISTS history (
            id TEXT PRIMARY KEY,
            collection TEXT NOT NULL,
            channel_id TEXT NOT NULL,
            message_id TEXT NOT NULL,
            url TEXT NOT NULL,
            author_id TEXT NOT NULL,
            kind TEXT NOT NULL CHECK(kind IN ('played', 'favorite')),
            title TEXT,
            favorited_at TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_history_message ON history(collection, message_id);
        CREATE INDEX IF NOT EXISTS idx_history_author ON history(collection, author_id, kind);

        PRAGMA user_version = 1;
        ",
    )?;

    tracing::info!("migrated to schema v1");
    Ok(())
}
