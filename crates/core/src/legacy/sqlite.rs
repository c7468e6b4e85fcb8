//! Legacy identities stored as JSON documents in SQLite.
//!
//! The legacy collection is a single table holding one serialized
//! [`LegacyIdentity`] per row. Cursors page through it by row id, one row
//! per query, so no more than one document is held in memory at a time.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use tracing::{debug, info};

use super::{decode_record, LegacyCursor, LegacyRecord, LegacyStore};
use crate::errors::{ConvertError, CursorError, DatabaseError};
use crate::models::LegacyIdentity;

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS identities (
    id   INTEGER PRIMARY KEY AUTOINCREMENT,
    doc  TEXT NOT NULL
);
"#;

/// Handle on a legacy SQLite identity collection.
pub struct LegacyDatabase {
    conn: Mutex<Connection>,
}

impl LegacyDatabase {
    /// Open (or create) a legacy database for writing, e.g. to seed it.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DatabaseError> {
        let path = path.as_ref();
        info!(path = %path.display(), "opening legacy database");
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
        conn.execute_batch(CREATE_TABLE)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an existing legacy database without write access.
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Self, DatabaseError> {
        let path = path.as_ref();
        info!(path = %path.display(), "opening legacy database read-only");
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an empty in-memory legacy database (useful for testing).
    pub fn in_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(CREATE_TABLE)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("legacy database mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Append a document to the collection, returning its row id.
    pub fn insert_document(&self, doc: &LegacyIdentity) -> Result<i64, DatabaseError> {
        let raw = serde_json::to_string(doc).map_err(|e| DatabaseError::Encoding {
            column: "doc".into(),
            detail: e.to_string(),
        })?;
        self.insert_raw(&raw)
    }

    /// Append a document exactly as given, without checking it decodes.
    pub fn insert_raw(&self, raw: &str) -> Result<i64, DatabaseError> {
        let conn = self.conn();
        conn.execute("INSERT INTO identities (doc) VALUES (?1)", params![raw])?;
        let id = conn.last_insert_rowid();
        debug!(id, "inserted legacy document");
        Ok(id)
    }

    /// Total number of documents in the collection.
    pub fn count_documents(&self) -> Result<i64, DatabaseError> {
        let count = self
            .conn()
            .query_row("SELECT COUNT(*) FROM identities", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Fetch the first row with an id greater than `after`.
    fn next_row(&self, after: i64) -> Result<Option<(i64, String)>, DatabaseError> {
        let row = self
            .conn()
            .query_row(
                "SELECT id, doc FROM identities WHERE id > ?1 ORDER BY id LIMIT 1",
                params![after],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(row)
    }
}

impl LegacyStore for LegacyDatabase {
    type Cursor<'a> = SqliteCursor<'a>;

    fn identities(&self) -> SqliteCursor<'_> {
        debug!("opening legacy identity cursor");
        SqliteCursor {
            db: self,
            last_id: 0,
            current: None,
            error: None,
            done: false,
        }
    }
}

/// Cursor over a [`LegacyDatabase`], ordered by row id.
pub struct SqliteCursor<'a> {
    db: &'a LegacyDatabase,
    last_id: i64,
    current: Option<LegacyRecord>,
    error: Option<CursorError>,
    done: bool,
}

impl SqliteCursor<'_> {
    fn stop(&mut self, error: Option<CursorError>) -> bool {
        self.done = true;
        self.current = None;
        if error.is_some() {
            self.error = error;
        }
        false
    }
}

impl LegacyCursor for SqliteCursor<'_> {
    fn advance(&mut self) -> bool {
        if self.done {
            return false;
        }
        let (id, raw) = match self.db.next_row(self.last_id) {
            Ok(Some(row)) => row,
            Ok(None) => return self.stop(None),
            Err(e) => return self.stop(Some(e.into())),
        };
        self.last_id = id;
        self.current = Some(decode_record(&raw, id as u64));
        true
    }

    fn current(&self) -> Option<Result<&LegacyIdentity, &ConvertError>> {
        self.current.as_ref().map(Result::as_ref)
    }

    fn take_error(&mut self) -> Option<CursorError> {
        self.error.take()
    }
}
