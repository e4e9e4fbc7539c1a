use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

use super::Lead;
use crate::error::StorageError;

/// Slot holding the last successful lead listing.
pub const LEADS_KEY: &str = "mitrafix_leads";

/// Local key/value store that keeps the admin view usable while the backend
/// is unreachable.
pub struct LeadCache {
    conn: Mutex<Connection>,
}

impl LeadCache {
    pub fn open(db_path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        Self::init(Connection::open(db_path)?)
    }

    pub fn in_memory() -> Result<Self, StorageError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS kv_cache (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            ",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn put(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.conn.lock().execute(
            "INSERT OR REPLACE INTO kv_cache (key, value, updated_at) VALUES (?1, ?2, ?3)",
            params![key, value, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let value = self
            .conn
            .lock()
            .query_row("SELECT value FROM kv_cache WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    pub fn store_leads(&self, leads: &[Lead]) -> Result<(), StorageError> {
        let json = serde_json::to_string(leads)?;
        self.put(LEADS_KEY, &json)
    }

    /// Cached leads, or an empty list when nothing was stored yet.
    pub fn load_leads(&self) -> Result<Vec<Lead>, StorageError> {
        match self.get(LEADS_KEY)? {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(Vec::new()),
        }
    }
}
