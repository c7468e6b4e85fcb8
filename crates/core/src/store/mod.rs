//! Destination store for canonical identities.
//!
//! [`Database`] owns a SQLite file holding the `identities` table (one row
//! per provider ID) and a log of completed migration runs. The migrator only
//! needs the narrow [`IdentityStore`] seam; [`NullStore`] satisfies it
//! without touching disk for dry runs.

pub mod queries;
pub mod schema;

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;
use tracing::{debug, info};

use crate::errors::DatabaseError;
use crate::models::Identity;

pub use queries::{MigrationRun, UpsertOutcome};

/// Anything that can receive migrated identities.
pub trait IdentityStore {
    /// Insert `identity`, or replace the stored identity with the same
    /// provider ID.
    fn upsert_identity(&self, identity: &Identity) -> Result<UpsertOutcome, DatabaseError>;
}

/// Accepts every identity and keeps none of them.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullStore;

impl IdentityStore for NullStore {
    fn upsert_identity(&self, _identity: &Identity) -> Result<UpsertOutcome, DatabaseError> {
        Ok(UpsertOutcome::Inserted)
    }
}

/// SQLite destination database.
///
/// Writes go through a single locked connection, so one `Database` can be
/// shared by reference while a migration streams into it.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open the destination file at `path`, creating it if needed.
    ///
    /// The schema is not touched until [`initialize`](Self::initialize).
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DatabaseError> {
        let path = path.as_ref();
        info!(path = %path.display(), "opening destination database");

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000;")?;
        Ok(Self::from_connection(conn))
    }

    /// A throwaway destination held in memory.
    pub fn in_memory() -> Result<Self, DatabaseError> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Bring the identity and run-log tables up to the current schema.
    pub fn initialize(&self) -> Result<(), DatabaseError> {
        let mut conn = self.conn();
        schema::run_migrations(&mut conn)?;
        debug!("destination schema ready");
        Ok(())
    }

    /// Lock the connection, recovering it if a previous holder panicked.
    pub fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("destination database lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

impl IdentityStore for Database {
    fn upsert_identity(&self, identity: &Identity) -> Result<UpsertOutcome, DatabaseError> {
        Database::upsert_identity(self, identity)
    }
}
