//! Database schema definitions and migrations.

use rusqlite::Connection;

use super::error::StoreError;

/// Current schema version. Increment when making schema changes.
pub const SCHEMA_VERSION: i32 = 1;

const SCHEMA_V1: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY,
    login TEXT NOT NULL UNIQUE,
    is_admin INTEGER NOT NULL DEFAULT 0,
    access_token TEXT,
    refresh_token TEXT
);

CREATE TABLE IF NOT EXISTS listens (
    user_id INTEGER NOT NULL,
    track_id TEXT NOT NULL,
    played_at INTEGER NOT NULL,
    PRIMARY KEY (user_id, track_id, played_at),
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_listens_user_played ON listens(user_id, played_at);

CREATE TABLE IF NOT EXISTS sync_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at INTEGER NOT NULL,
    completed_at INTEGER,
    users_seen INTEGER DEFAULT 0,
    users_synced INTEGER DEFAULT 0,
    users_skipped INTEGER DEFAULT 0,
    listens_recorded INTEGER DEFAULT 0,
    interrupted INTEGER DEFAULT 0
);
"#;

pub(crate) fn get_schema_version(conn: &Connection) -> Result<i32, StoreError> {
    let version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version)
}

/// Initialize or migrate the database schema.
///
/// Idempotent: safe on both new and existing databases. Refuses to touch a
/// database written by a newer version.
pub(crate) fn migrate(conn: &Connection) -> Result<(), StoreError> {
    let current_version = get_schema_version(conn)?;

    if current_version > SCHEMA_VERSION {
        return Err(StoreError::UnsupportedSchemaVersion {
            found: current_version,
            expected: SCHEMA_VERSION,
        });
    }

    if current_version < SCHEMA_VERSION {
        conn.execute_batch(SCHEMA_V1)?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        tracing::debug!(
            from = current_version,
            to = SCHEMA_VERSION,
            "Migrated database schema"
        );
    }

    Ok(())
}
