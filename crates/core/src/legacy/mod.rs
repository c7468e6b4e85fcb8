//! Read access to the legacy identity collection.
//!
//! A [`LegacyStore`] is an open handle on a legacy collection; each call to
//! [`LegacyStore::identities`] starts a fresh [`LegacyCursor`] over every
//! document in it. Three stores are provided:
//! 1. [`LegacyDatabase`]: SQLite table of JSON documents
//! 2. [`DumpFile`]: JSON-lines export of the collection
//! 3. [`MemoryStore`]: in-memory documents, for tests and fixtures

pub mod dump;
pub mod memory;
pub mod sqlite;

use crate::errors::{ConvertError, CursorError};
use crate::models::LegacyIdentity;

pub use dump::DumpFile;
pub use memory::MemoryStore;
pub use sqlite::LegacyDatabase;

/// A document read by a cursor, or the reason it could not be decoded.
pub type LegacyRecord = Result<LegacyIdentity, ConvertError>;

/// Sequential read handle over legacy documents.
///
/// Each [`advance`](Self::advance) performs at most one blocking read. A
/// document that does not decode is still a record: it comes back from
/// [`current`](Self::current) as [`ConvertError::Undecodable`] and the cursor
/// carries on with the next one.
pub trait LegacyCursor {
    /// Move to the next record. Returns `false` once the collection is
    /// exhausted or a read fails; check [`take_error`](Self::take_error) to
    /// tell the two apart.
    fn advance(&mut self) -> bool;

    /// The record read by the last successful `advance`.
    fn current(&self) -> Option<Result<&LegacyIdentity, &ConvertError>>;

    /// Take the error that stopped the cursor, if any.
    fn take_error(&mut self) -> Option<CursorError>;
}

/// An open legacy collection that can be iterated from the start.
pub trait LegacyStore {
    type Cursor<'a>: LegacyCursor
    where
        Self: 'a;

    /// Open a cursor over the whole collection, unfiltered.
    fn identities(&self) -> Self::Cursor<'_>;
}

/// Decode one stored document, recording `position` on failure.
pub(crate) fn decode_record(raw: &str, position: u64) -> LegacyRecord {
    serde_json::from_str(raw).map_err(|e| ConvertError::Undecodable {
        position,
        detail: e.to_string(),
    })
}
