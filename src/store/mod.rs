//! Persistent store for users, their credentials and their listens.
//!
//! One SQLite database backs three roles:
//! - [`CredentialStore`]: current access/refresh token pair per user
//! - [`ListenRecorder`]: idempotent sink keyed on (user, track, played_at)
//! - [`SyncHistory`]: one row per sync cycle for status reporting

pub mod db;
pub mod error;
pub mod lock;
pub mod schema;
pub mod types;

pub use db::{CredentialStore, ListenRecorder, SqliteStore, SyncHistory};
pub use error::StoreError;
pub use lock::WorkerLock;
pub use types::{ListenEvent, SyncRunStats, TokenPair, UserCredentials, UserId};
