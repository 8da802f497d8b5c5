//! Persistence adapters for the book collection.
//!
//! The whole collection is written as one JSON blob under a fixed key, so a
//! save is a single upsert and a load either yields the full set or nothing.

use crate::error::LibraryError;
use crate::models::Book;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

/// Key under which the serialized collection lives.
const LIBRARY_KEY: &str = "library.books";

/// Storage backend contract: persist and reload the full collection.
///
/// `load` of an empty backend returns an empty vec; a corrupt blob is an
/// error, which the store recovers from by starting empty.
pub trait StorageAdapter: Send {
    fn save(&self, books: &[Book]) -> Result<(), LibraryError>;
    fn load(&self) -> Result<Vec<Book>, LibraryError>;
}

/// SQLite-backed adapter. One key/value table, one row for the library.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Open or create the database file at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, LibraryError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self, LibraryError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, LibraryError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS library (
                key TEXT PRIMARY KEY,
                value BLOB NOT NULL
            )",
            [],
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl StorageAdapter for SqliteStorage {
    fn save(&self, books: &[Book]) -> Result<(), LibraryError> {
        let blob = serde_json::to_vec(books)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO library (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![LIBRARY_KEY, blob],
        )?;
        Ok(())
    }

    fn load(&self) -> Result<Vec<Book>, LibraryError> {
        let conn = self.conn.lock().unwrap();
        let blob: Option<Vec<u8>> = conn
            .query_row(
                "SELECT value FROM library WHERE key = ?1",
                params![LIBRARY_KEY],
                |row| row.get(0),
            )
            .optional()?;
        match blob {
            Some(blob) => Ok(serde_json::from_slice(&blob)?),
            None => Ok(Vec::new()),
        }
    }
}

/// Adapter that keeps everything in memory. Useful for tests and for
/// ephemeral libraries.
#[derive(Default)]
pub struct MemoryStorage {
    books: Mutex<Vec<Book>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageAdapter for MemoryStorage {
    fn save(&self, books: &[Book]) -> Result<(), LibraryError> {
        *self.books.lock().unwrap() = books.to_vec();
        Ok(())
    }

    fn load(&self) -> Result<Vec<Book>, LibraryError> {
        Ok(self.books.lock().unwrap().clone())
    }
}
