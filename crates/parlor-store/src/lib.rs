pub mod migrations;
pub mod models;
pub mod queries;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

use parlor_types::models::{ChatMessage, DmMessage, PinnedMessage};

/// Everything the engine loads at startup. The engine must function
/// correctly (empty collections) when the store has nothing.
#[derive(Debug, Default)]
pub struct Snapshot {
    /// All retained messages across channels, in id order.
    pub messages: Vec<ChatMessage>,
    /// message id -> emoji -> reactor names.
    pub reactions: HashMap<u64, HashMap<String, Vec<String>>>,
    pub pins: Vec<PinnedMessage>,
    /// thread key -> ordered messages.
    pub dms: HashMap<String, Vec<DmMessage>>,
}

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")?;

        migrations::run(&conn)?;

        info!("Database opened at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        f(&conn)
    }
}
