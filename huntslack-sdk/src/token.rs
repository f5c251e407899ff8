//! Persistent per-user access tokens.
//!
//! Tokens are stored per hunt user id under the `slackAccessToken` key of
//! that user's private data.

use std::collections::HashMap;
use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension};

use crate::error::Result;

/// Key under which the Slack token is kept in a user's private data.
pub const SLACK_TOKEN_KEY: &str = "slackAccessToken";

/// Where access tokens are read from at connect time and written to after
/// the first successful authorization.
pub trait TokenStore: Send + Sync {
    fn load(&self, user_id: &str) -> Result<Option<String>>;
    fn save(&self, user_id: &str, token: &str) -> Result<()>;
}

/// SQLite-backed user private data.
pub struct SqliteTokenStore {
    db: Mutex<Connection>,
}

impl SqliteTokenStore {
    /// Open or create the store at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let db = Connection::open(path)?;
        db.execute_batch(
            "CREATE TABLE IF NOT EXISTS user_private_data (
                user_id TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (user_id, key)
            );",
        )?;
        Ok(Self { db: Mutex::new(db) })
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        Self::open(Path::new(":memory:"))
    }
}

impl TokenStore for SqliteTokenStore {
    fn load(&self, user_id: &str) -> Result<Option<String>> {
        let db = self.db.lock();
        let token = db
            .query_row(
                "SELECT value FROM user_private_data WHERE user_id = ?1 AND key = ?2",
                rusqlite::params![user_id, SLACK_TOKEN_KEY],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(token)
    }

    fn save(&self, user_id: &str, token: &str) -> Result<()> {
        let db = self.db.lock();
        db.execute(
            "INSERT OR REPLACE INTO user_private_data (user_id, key, value) VALUES (?1, ?2, ?3)",
            rusqlite::params![user_id, SLACK_TOKEN_KEY, token],
        )?;
        Ok(())
    }
}

/// Process-local store; nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    tokens: Mutex<HashMap<String, String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(user_id: &str, token: &str) -> Self {
        let store = Self::new();
        store.tokens.lock().insert(user_id.to_string(), token.to_string());
        store
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self, user_id: &str) -> Result<Option<String>> {
        Ok(self.tokens.lock().get(user_id).cloned())
    }

    fn save(&self, user_id: &str, token: &str) -> Result<()> {
        self.tokens.lock().insert(user_id.to_string(), token.to_string());
        Ok(())
    }
}
