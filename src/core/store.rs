//! SQLite-backed document store.
//!
//! Every component persists JSON documents into named collections of a single
//! `documents` table. Keys are unique per collection; the insertion sequence
//! gives a stable order for listing and for breaking timestamp ties.

use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS documents (
        seq         INTEGER PRIMARY KEY AUTOINCREMENT,
        collection  TEXT NOT NULL,
        key         TEXT NOT NULL,
        body        TEXT NOT NULL,
        UNIQUE (collection, key)
    );

    CREATE INDEX IF NOT EXISTS idx_documents_collection
        ON documents(collection);
";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("malformed document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to prepare store directory: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Collection {
    Providers,
    Personas,
    Sessions,
    Interactions,
    ArenaRounds,
}

impl Collection {
    pub fn as_str(self) -> &'static str {
        match self {
            Collection::Providers => "providers",
            Collection::Personas => "personas",
            Collection::Sessions => "sessions",
            Collection::Interactions => "interactions",
            Collection::ArenaRounds => "arena_rounds",
        }
    }
}

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open or create a store at the given path, creating parent directories.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        Self::init(Connection::open(path)?)
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace the document stored under `key`, keeping its position.
    pub fn upsert<T: Serialize>(
        &self,
        collection: Collection,
        key: &str,
        doc: &T,
    ) -> Result<(), StoreError> {
        let body = serde_json::to_string(doc)?;
        self.conn().execute(
            "INSERT INTO documents (collection, key, body) VALUES (?1, ?2, ?3)
             ON CONFLICT (collection, key) DO UPDATE SET body = excluded.body",
            params![collection.as_str(), key, body],
        )?;
        Ok(())
    }

    /// Append a new document. Fails if `key` already exists in the collection.
    pub fn insert<T: Serialize>(
        &self,
        collection: Collection,
        key: &str,
        doc: &T,
    ) -> Result<(), StoreError> {
        let body = serde_json::to_string(doc)?;
        self.conn().execute(
            "INSERT INTO documents (collection, key, body) VALUES (?1, ?2, ?3)",
            params![collection.as_str(), key, body],
        )?;
        Ok(())
    }

    /// Replace an existing document. Returns false when no document has `key`.
    pub fn update<T: Serialize>(
        &self,
        collection: Collection,
        key: &str,
        doc: &T,
    ) -> Result<bool, StoreError> {
        let body = serde_json::to_string(doc)?;
        let changed = self.conn().execute(
            "UPDATE documents SET body = ?3 WHERE collection = ?1 AND key = ?2",
            params![collection.as_str(), key, body],
        )?;
        Ok(changed > 0)
    }

    pub fn get<T: DeserializeOwned>(
        &self,
        collection: Collection,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        let body: Option<String> = self
            .conn()
            .query_row(
                "SELECT body FROM documents WHERE collection = ?1 AND key = ?2",
                params![collection.as_str(), key],
                |row| row.get(0),
            )
            .optional()?;
        body.map(|body| serde_json::from_str(&body))
            .transpose()
            .map_err(StoreError::from)
    }

    /// All documents of a collection in insertion order.
    pub fn all<T: DeserializeOwned>(&self, collection: Collection) -> Result<Vec<T>, StoreError> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT body FROM documents WHERE collection = ?1 ORDER BY seq")?;
        let bodies = stmt
            .query_map(params![collection.as_str()], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        decode_all(bodies)
    }

    /// Documents whose top-level string `field` equals `value`, in insertion order.
    pub fn find<T: DeserializeOwned>(
        &self,
        collection: Collection,
        field: &str,
        value: &str,
    ) -> Result<Vec<T>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT body FROM documents
             WHERE collection = ?1 AND json_extract(body, ?2) = ?3
             ORDER BY seq",
        )?;
        let bodies = stmt
            .query_map(
                params![collection.as_str(), json_path(field), value],
                |row| row.get::<_, String>(0),
            )?
            .collect::<Result<Vec<_>, _>>()?;
        decode_all(bodies)
    }

    /// Remove one document. Removing a missing key is not an error.
    pub fn remove(&self, collection: Collection, key: &str) -> Result<usize, StoreError> {
        Ok(self.conn().execute(
            "DELETE FROM documents WHERE collection = ?1 AND key = ?2",
            params![collection.as_str(), key],
        )?)
    }

    /// Remove every document whose `field` equals `value`.
    pub fn remove_where(
        &self,
        collection: Collection,
        field: &str,
        value: &str,
    ) -> Result<usize, StoreError> {
        Ok(self.conn().execute(
            "DELETE FROM documents WHERE collection = ?1 AND json_extract(body, ?2) = ?3",
            params![collection.as_str(), json_path(field), value],
        )?)
    }

    pub fn truncate(&self, collection: Collection) -> Result<usize, StoreError> {
        Ok(self.conn().execute(
            "DELETE FROM documents WHERE collection = ?1",
            params![collection.as_str()],
        )?)
    }

    pub fn count(&self, collection: Collection) -> Result<usize, StoreError> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM documents WHERE collection = ?1",
            params![collection.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

fn json_path(field: &str) -> String {
    format!("$.{field}")
}

fn decode_all<T: DeserializeOwned>(bodies: Vec<String>) -> Result<Vec<T>, StoreError> {
    bodies
        .iter()
        .map(|body| serde_json::from_str(body).map_err(StoreError::from))
        .collect()
}
