//! Store traits and SQLite implementation.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rusqlite::{Connection, OptionalExtension};

use super::error::StoreError;
use super::schema;
use super::types::{
    ListenEvent, StoreSummary, SyncRunRecord, SyncRunStats, TokenPair, UserCredentials, UserId,
};

/// Durable mapping from user identity to the current credential pair.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// List every known user with whatever credentials are on record.
    async fn list_users(&self) -> Result<Vec<UserCredentials>, StoreError>;

    /// Atomically replace a user's credential pair.
    async fn update_credentials(&self, user: UserId, tokens: &TokenPair) -> Result<(), StoreError>;
}

/// Deduplicating sink for listen events.
#[async_trait]
pub trait ListenRecorder: Send + Sync {
    /// Persist one event. Re-recording an existing natural key is a no-op.
    ///
    /// Returns `true` when a new row was written.
    async fn record(&self, event: &ListenEvent) -> Result<bool, StoreError>;
}

/// Per-cycle bookkeeping.
#[async_trait]
pub trait SyncHistory: Send + Sync {
    /// Start a new sync run and return its ID.
    async fn start_sync_run(&self) -> Result<i64, StoreError>;

    /// Complete a sync run with statistics.
    async fn complete_sync_run(&self, run_id: i64, stats: &SyncRunStats)
        -> Result<(), StoreError>;
}

/// SQLite implementation of all store traits.
pub struct SqliteStore {
    /// Wrapped in Mutex because rusqlite::Connection is not Sync.
    /// Statements are short; the guard never lives across an await.
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open or create a database at the given path and bring its schema up
    /// to date.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let path = path.to_path_buf();
        let path_clone = path.clone();

        let conn = tokio::task::spawn_blocking(move || {
            if let Some(parent) = path_clone.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| StoreError::CreateDir {
                        path: parent.to_path_buf(),
                        source: e,
                    })?;
                }
            }

            let conn = Connection::open(&path_clone).map_err(|e| StoreError::Open {
                path: path_clone.clone(),
                source: e,
            })?;
            configure(&conn)?;
            conn.pragma_update(None, "journal_mode", "WAL")
                .map_err(StoreError::Migration)?;
            conn.pragma_update(None, "synchronous", "NORMAL")
                .map_err(StoreError::Migration)?;
            schema::migrate(&conn)?;

            Ok::<_, StoreError>(conn)
        })
        .await??;

        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Open an in-memory database (for testing).
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::Open {
            path: PathBuf::from(":memory:"),
            source: e,
        })?;
        configure(&conn)?;
        schema::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: PathBuf::from(":memory:"),
        })
    }

    /// Insert a user row directly (for testing).
    #[cfg(test)]
    pub fn insert_user(
        &self,
        login: &str,
        access_token: Option<&str>,
        refresh_token: Option<&str>,
    ) -> Result<UserId, StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO users (login, access_token, refresh_token) VALUES (?1, ?2, ?3)",
            rusqlite::params![login, access_token, refresh_token],
        )
        .map_err(StoreError::query)?;
        Ok(UserId(conn.last_insert_rowid()))
    }

    /// Path to the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Query(e.to_string()))
    }

    /// Summarize users, listens and the latest sync run.
    pub async fn get_summary(&self) -> Result<StoreSummary, StoreError> {
        let conn = self.lock()?;

        let count = |sql: &str| -> Result<u64, StoreError> {
            conn.query_row(sql, [], |row| row.get::<_, i64>(0))
                .map(|n| n as u64)
                .map_err(StoreError::query)
        };

        let total_users = count("SELECT COUNT(*) FROM users")?;
        let provisioned_users = count(
            "SELECT COUNT(*) FROM users WHERE access_token IS NOT NULL AND access_token <> ''",
        )?;
        let total_listens = count("SELECT COUNT(*) FROM listens")?;

        let last_run = conn
            .query_row(
                "SELECT started_at, completed_at, users_seen, users_synced, users_skipped, listens_recorded, interrupted FROM sync_runs ORDER BY id DESC LIMIT 1",
                [],
                |row| {
                    let started_at: i64 = row.get(0)?;
                    let completed_at: Option<i64> = row.get(1)?;
                    Ok(SyncRunRecord {
                        started_at: from_secs(started_at),
                        completed_at: completed_at.map(from_secs),
                        stats: SyncRunStats {
                            users_seen: row.get::<_, i64>(2)? as u64,
                            users_synced: row.get::<_, i64>(3)? as u64,
                            users_skipped: row.get::<_, i64>(4)? as u64,
                            listens_recorded: row.get::<_, i64>(5)? as u64,
                            interrupted: row.get::<_, i64>(6)? != 0,
                        },
                    })
                },
            )
            .optional()
            .map_err(StoreError::query)?;

        Ok(StoreSummary {
            total_users,
            provisioned_users,
            total_listens,
            last_run,
        })
    }

    /// All listens of `user` on the given UTC day, oldest first.
    pub async fn listens_on(
        &self,
        user: UserId,
        day: NaiveDate,
    ) -> Result<Vec<ListenEvent>, StoreError> {
        let start = day
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp_millis())
            .unwrap_or_default();
        let end = start + 86_400_000;

        let conn = self.lock()?;
        let mut stmt = conn
            .prepare_cached(
                "SELECT track_id, played_at FROM listens WHERE user_id = ?1 AND played_at >= ?2 AND played_at < ?3 ORDER BY played_at ASC",
            )
            .map_err(StoreError::query)?;

        let events = stmt
            .query_map(rusqlite::params![user.0, start, end], |row| {
                Ok(ListenEvent {
                    user_id: user,
                    track_id: row.get(0)?,
                    played_at: from_millis(row.get(1)?),
                })
            })
            .map_err(StoreError::query)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::query)?;

        Ok(events)
    }
}

#[async_trait]
impl CredentialStore for SqliteStore {
    async fn list_users(&self) -> Result<Vec<UserCredentials>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare_cached("SELECT id, access_token, refresh_token FROM users ORDER BY id")
            .map_err(StoreError::query)?;

        let users = stmt
            .query_map([], |row| {
                Ok(UserCredentials {
                    id: UserId(row.get(0)?),
                    access_token: row.get(1)?,
                    refresh_token: row.get(2)?,
                })
            })
            .map_err(StoreError::query)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::query)?;

        Ok(users)
    }

    async fn update_credentials(&self, user: UserId, tokens: &TokenPair) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let rows = conn
            .execute(
                "UPDATE users SET access_token = ?1, refresh_token = ?2 WHERE id = ?3",
                rusqlite::params![tokens.access_token, tokens.refresh_token, user.0],
            )
            .map_err(StoreError::query)?;

        if rows == 0 {
            return Err(StoreError::Query(format!("user {user} no longer exists")));
        }
        Ok(())
    }
}

#[async_trait]
impl ListenRecorder for SqliteStore {
    async fn record(&self, event: &ListenEvent) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let rows = conn
            .prepare_cached(
                "INSERT INTO listens (user_id, track_id, played_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT (user_id, track_id, played_at) DO NOTHING",
            )
            .and_then(|mut stmt| {
                stmt.execute(rusqlite::params![
                    event.user_id.0,
                    event.track_id,
                    event.played_at.timestamp_millis(),
                ])
            })
            .map_err(StoreError::query)?;

        Ok(rows > 0)
    }
}

#[async_trait]
impl SyncHistory for SqliteStore {
    async fn start_sync_run(&self) -> Result<i64, StoreError> {
        let started_at = Utc::now().timestamp();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO sync_runs (started_at) VALUES (?1)",
            [started_at],
        )
        .map_err(StoreError::query)?;
        Ok(conn.last_insert_rowid())
    }

    async fn complete_sync_run(
        &self,
        run_id: i64,
        stats: &SyncRunStats,
    ) -> Result<(), StoreError> {
        let completed_at = Utc::now().timestamp();
        let conn = self.lock()?;
        conn.execute(
            "UPDATE sync_runs SET completed_at = ?1, users_seen = ?2, users_synced = ?3, users_skipped = ?4, listens_recorded = ?5, interrupted = ?6 WHERE id = ?7",
            rusqlite::params![
                completed_at,
                stats.users_seen as i64,
                stats.users_synced as i64,
                stats.users_skipped as i64,
                stats.listens_recorded as i64,
                stats.interrupted as i64,
                run_id,
            ],
        )
        .map_err(StoreError::query)?;
        Ok(())
    }
}

fn configure(conn: &Connection) -> Result<(), StoreError> {
    conn.pragma_update(None, "foreign_keys", "ON")
        .map_err(StoreError::Migration)?;
    conn.busy_timeout(std::time::Duration::from_secs(5))
        .map_err(StoreError::Migration)?;
    Ok(())
}

fn from_secs(ts: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(ts, 0)
        .single()
        .unwrap_or(DateTime::UNIX_EPOCH)
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or(DateTime::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listen(user: UserId, track: &str, played_at: &str) -> ListenEvent {
        ListenEvent {
            user_id: user,
            track_id: track.to_string(),
            played_at: DateTime::parse_from_rfc3339(played_at)
                .unwrap()
                .with_timezone(&Utc),
        }
    }

    #[tokio::test]
    async fn test_open_creates_db() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("listens.db");
        let store = SqliteStore::open(&path).await.unwrap();
        assert!(path.exists());
        assert_eq!(store.path(), path);
    }

    #[tokio::test]
    async fn test_reopen_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("listens.db");
        {
            let store = SqliteStore::open(&path).await.unwrap();
            store.insert_user("ana", Some("a"), Some("r")).unwrap();
        }
        let store = SqliteStore::open(&path).await.unwrap();
        assert_eq!(store.list_users().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_users_in_id_order() {
        let store = SqliteStore::open_in_memory().unwrap();
        let a = store.insert_user("ana", Some("a1"), Some("r1")).unwrap();
        let b = store.insert_user("ben", None, None).unwrap();

        let users = store.list_users().await.unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].id, a);
        assert_eq!(users[0].access_token.as_deref(), Some("a1"));
        assert_eq!(users[0].refresh_token.as_deref(), Some("r1"));
        assert_eq!(users[1].id, b);
        assert!(users[1].access_token.is_none());
    }

    #[tokio::test]
    async fn test_update_credentials() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = store.insert_user("ana", Some("T1"), Some("R1")).unwrap();

        store
            .update_credentials(id, &TokenPair::new("T2", "R2"))
            .await
            .unwrap();

        let users = store.list_users().await.unwrap();
        assert_eq!(users[0].access_token.as_deref(), Some("T2"));
        assert_eq!(users[0].refresh_token.as_deref(), Some("R2"));
    }

    #[tokio::test]
    async fn test_update_credentials_unknown_user() {
        let store = SqliteStore::open_in_memory().unwrap();
        let result = store
            .update_credentials(UserId(42), &TokenPair::new("T", "R"))
            .await;
        assert!(matches!(result, Err(StoreError::Query(_))));
    }

    #[tokio::test]
    async fn test_record_is_idempotent() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = store.insert_user("ana", Some("a"), Some("r")).unwrap();
        let event = listen(id, "trk1", "2024-01-01T00:00:00Z");

        assert!(store.record(&event).await.unwrap());
        assert!(!store.record(&event).await.unwrap());
        assert!(!store.record(&event).await.unwrap());

        assert_eq!(store.get_summary().await.unwrap().total_listens, 1);
    }

    #[tokio::test]
    async fn test_record_same_instant_different_spelling() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = store.insert_user("ana", Some("a"), Some("r")).unwrap();

        assert!(store
            .record(&listen(id, "trk1", "2024-01-01T00:00:00Z"))
            .await
            .unwrap());
        assert!(!store
            .record(&listen(id, "trk1", "2024-01-01T00:00:00.000Z"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_record_distinguishes_key_components() {
        let store = SqliteStore::open_in_memory().unwrap();
        let a = store.insert_user("ana", Some("a"), Some("r")).unwrap();
        let b = store.insert_user("ben", Some("b"), Some("r")).unwrap();

        store.record(&listen(a, "trk1", "2024-01-01T00:00:00Z")).await.unwrap();
        store.record(&listen(b, "trk1", "2024-01-01T00:00:00Z")).await.unwrap();
        store.record(&listen(a, "trk2", "2024-01-01T00:00:00Z")).await.unwrap();
        store.record(&listen(a, "trk1", "2024-01-01T00:03:00Z")).await.unwrap();

        assert_eq!(store.get_summary().await.unwrap().total_listens, 4);
    }

    #[tokio::test]
    async fn test_record_unknown_user_fails() {
        let store = SqliteStore::open_in_memory().unwrap();
        let result = store
            .record(&listen(UserId(7), "trk1", "2024-01-01T00:00:00Z"))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_listens_on_day() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = store.insert_user("ana", Some("a"), Some("r")).unwrap();

        store.record(&listen(id, "late", "2024-01-01T23:59:59Z")).await.unwrap();
        store.record(&listen(id, "early", "2024-01-01T00:00:00Z")).await.unwrap();
        store.record(&listen(id, "next", "2024-01-02T00:00:00Z")).await.unwrap();
        store.record(&listen(id, "prev", "2023-12-31T23:59:59Z")).await.unwrap();

        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let events = store.listens_on(id, day).await.unwrap();
        let tracks: Vec<&str> = events.iter().map(|e| e.track_id.as_str()).collect();
        assert_eq!(tracks, vec!["early", "late"]);
        assert_eq!(
            events[0].played_at,
            DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z").unwrap()
        );
    }

    #[tokio::test]
    async fn test_summary_and_sync_runs() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_user("ana", Some("a"), Some("r")).unwrap();
        store.insert_user("admin", None, None).unwrap();

        let empty = store.get_summary().await.unwrap();
        assert_eq!(empty.total_users, 2);
        assert_eq!(empty.provisioned_users, 1);
        assert!(empty.last_run.is_none());

        let run = store.start_sync_run().await.unwrap();
        let stats = SyncRunStats {
            users_seen: 2,
            users_synced: 1,
            users_skipped: 1,
            listens_recorded: 3,
            interrupted: false,
        };
        store.complete_sync_run(run, &stats).await.unwrap();

        let last = store.get_summary().await.unwrap().last_run.unwrap();
        assert!(last.completed_at.is_some());
        assert_eq!(last.stats, stats);
    }
}
