mod games;
mod gameservers;
mod migrations;
mod seed;
mod tasks;

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::error::StoreError;

/// The persistent store (spec §4.1). A single process-wide handle wrapping
/// a `rusqlite::Connection` behind a mutex: spec §5 assumes every
/// store operation is synchronous and thread-safe, which a `Mutex` around a
/// plain blocking connection gives for free, with none of the
/// async-driver-vs-sync-schema impedance a pool-based async driver would
/// introduce.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Opens (creating if absent) the SQLite file at `path`, runs
    /// migrations, and seeds the Game catalog if it is empty.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::OperationFailed(e.to_string()))?;
            }
        }

        let conn = Connection::open(path)?;
        migrations::run(&conn)?;
        let store = Store {
            conn: Mutex::new(conn),
        };
        store.seed_if_empty()?;
        Ok(store)
    }

    /// In-memory store for tests; behaves identically except nothing is
    /// kept across process restarts.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        migrations::run(&conn)?;
        let store = Store {
            conn: Mutex::new(conn),
        };
        store.seed_if_empty()?;
        Ok(store)
    }

    fn seed_if_empty(&self) -> Result<(), StoreError> {
        let count: i64 = {
            let conn = self.conn.lock().unwrap();
            conn.query_row("SELECT COUNT(*) FROM games", [], |row| row.get(0))?
        };

        if count == 0 {
            for game in seed::default_games() {
                self.create_game(game)?;
            }
        }
        Ok(())
    }
}

pub(crate) fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

pub(crate) fn fmt_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339()
}
