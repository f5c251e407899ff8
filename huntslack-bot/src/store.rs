//! Hunt data backed by SQLite.
//!
//! The admin app appends JSON events to `event_log` and keeps the current
//! puzzle and user documents in `puzzles` / `users`. The notifier only reads;
//! the write side exists for the admin tooling and tests.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::model::{HuntEvent, Puzzle, User};

/// One row of the event log. `event` is `None` when the payload didn't decode.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub id: i64,
    pub event: Option<HuntEvent>,
}

pub struct HuntStore {
    db: Mutex<Connection>,
}

impl HuntStore {
    /// Open or create a hunt database.
    pub fn open(path: &Path) -> Result<Self> {
        let db = Connection::open(path).context("Failed to open hunt database")?;
        db.execute_batch(
            "CREATE TABLE IF NOT EXISTS event_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                payload TEXT NOT NULL,
                recorded_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS puzzles (
                id TEXT PRIMARY KEY,
                doc TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                doc TEXT NOT NULL
            );",
        )?;
        Ok(Self { db: Mutex::new(db) })
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        Self::open(Path::new(":memory:"))
    }

    /// Append an event; returns its log id.
    pub fn append_event(&self, event: &HuntEvent) -> Result<i64> {
        self.append_raw(&serde_json::to_string(event)?)
    }

    /// Append a raw JSON payload as-is.
    pub fn append_raw(&self, payload: &str) -> Result<i64> {
        let db = self.db.lock();
        db.execute(
            "INSERT INTO event_log (payload, recorded_at) VALUES (?1, ?2)",
            rusqlite::params![payload, Utc::now().to_rfc3339()],
        )?;
        Ok(db.last_insert_rowid())
    }

    /// Log entries with id greater than `cursor`, oldest first.
    pub fn events_after(&self, cursor: i64, limit: usize) -> Result<Vec<LogEntry>> {
        let db = self.db.lock();
        let mut stmt =
            db.prepare("SELECT id, payload FROM event_log WHERE id > ?1 ORDER BY id ASC LIMIT ?2")?;
        let rows = stmt
            .query_map(rusqlite::params![cursor, limit as i64], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows
            .into_iter()
            .map(|(id, payload)| {
                let event = match serde_json::from_str(&payload) {
                    Ok(e) => Some(e),
                    Err(e) => {
                        tracing::warn!(id, "Undecodable event log entry: {e}");
                        None
                    }
                };
                LogEntry { id, event }
            })
            .collect())
    }

    pub fn put_puzzle(&self, id: &str, puzzle: &Puzzle) -> Result<()> {
        self.put_doc("puzzles", id, puzzle)
    }

    pub fn puzzle(&self, id: &str) -> Result<Option<Puzzle>> {
        self.get_doc("puzzles", id)
    }

    pub fn put_user(&self, id: &str, user: &User) -> Result<()> {
        self.put_doc("users", id, user)
    }

    pub fn user(&self, id: &str) -> Result<Option<User>> {
        self.get_doc("users", id)
    }

    fn put_doc<T: Serialize>(&self, table: &str, id: &str, doc: &T) -> Result<()> {
        let json = serde_json::to_string(doc)?;
        self.db.lock().execute(
            &format!("INSERT OR REPLACE INTO {table} (id, doc) VALUES (?1, ?2)"),
            rusqlite::params![id, json],
        )?;
        Ok(())
    }

    fn get_doc<T: DeserializeOwned>(&self, table: &str, id: &str) -> Result<Option<T>> {
        let json: Option<String> = self
            .db
            .lock()
            .query_row(
                &format!("SELECT doc FROM {table} WHERE id = ?1"),
                rusqlite::params![id],
                |row| row.get(0),
            )
            .optional()?;
        json.map(|j| serde_json::from_str(&j).with_context(|| format!("bad {table} document {id}")))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn puzzle() -> Puzzle {
        Puzzle {
            name: "Crossword".into(),
            host: "hunt.example.com".into(),
            path: "/puzzles/crossword".into(),
            is_meta: false,
            solution: None,
            slack_channel: None,
            slack_channel_id: None,
        }
    }

    #[test]
    fn event_log_is_read_in_order_past_cursor() {
        let store = HuntStore::in_memory().unwrap();
        let a = store
            .append_event(&HuntEvent::PuzzleCreated {
                puzzle_id: "p1".into(),
                timestamp_ms: 1,
            })
            .unwrap();
        let b = store.append_raw("not json").unwrap();
        let c = store
            .append_event(&HuntEvent::PuzzleCreated {
                puzzle_id: "p2".into(),
                timestamp_ms: 2,
            })
            .unwrap();

        let all = store.events_after(0, 100).unwrap();
        assert_eq!(all.iter().map(|e| e.id).collect::<Vec<_>>(), vec![a, b, c]);
        assert!(all[1].event.is_none());

        let rest = store.events_after(b, 100).unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].id, c);

        assert_eq!(store.events_after(0, 1).unwrap().len(), 1);
    }

    #[test]
    fn documents_replace_by_id() {
        let store = HuntStore::in_memory().unwrap();
        assert!(store.puzzle("p1").unwrap().is_none());

        store.put_puzzle("p1", &puzzle()).unwrap();
        let mut solved = puzzle();
        solved.solution = Some("ANSWER".into());
        store.put_puzzle("p1", &solved).unwrap();
        assert_eq!(store.puzzle("p1").unwrap(), Some(solved));

        let user = User {
            display_name: "Ada".into(),
            slack_user_id: None,
        };
        store.put_user("u1", &user).unwrap();
        assert_eq!(store.user("u1").unwrap(), Some(user));
        assert!(store.user("u2").unwrap().is_none());
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hunt.db");
        {
            let store = HuntStore::open(&path).unwrap();
            store.put_puzzle("p1", &puzzle()).unwrap();
        }
        let store = HuntStore::open(&path).unwrap();
        assert_eq!(store.puzzle("p1").unwrap().map(|p| p.name), Some("Crossword".into()));
    }
}
