//! Error types for the idmigrate core library.
//!
//! Each subsystem has its own error type derived with `thiserror`. Per-record
//! problems are [`ConvertError`]s; everything else ends the operation that
//! raised it.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Conversion errors
// ---------------------------------------------------------------------------

/// Per-record failures turning a legacy document into a canonical identity.
///
/// These never terminate a migration: the streaming source reports them and
/// moves on to the next document.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConvertError {
    /// No classifier rule matched the legacy external ID.
    #[error("unrecognised external ID {external_id:?}")]
    UnrecognizedExternalId { external_id: String },

    /// The owner field holds a value outside the owner allow-list.
    #[error("unrecognised owner for {username} ({owner:?})")]
    UnrecognizedOwner { username: String, owner: String },

    /// The document has no username.
    #[error("legacy document has no username")]
    MissingUsername,

    /// A stored document could not be decoded into the legacy schema.
    /// `position` is the row id or dump line number.
    #[error("cannot decode legacy document at position {position}: {detail}")]
    Undecodable { position: u64, detail: String },
}

// ---------------------------------------------------------------------------
// Cursor errors
// ---------------------------------------------------------------------------

/// Failures reading from a legacy document cursor.
#[derive(Debug, Error)]
pub enum CursorError {
    /// The legacy SQLite store could not be queried.
    #[error("legacy store query failed: {0}")]
    Database(#[from] DatabaseError),

    /// Reading a dump file failed.
    #[error("legacy dump I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure injected by a test or fixture cursor.
    #[error("{0}")]
    Other(String),
}

// ---------------------------------------------------------------------------
// Source errors
// ---------------------------------------------------------------------------

/// Terminal errors reported by an identity source once iteration ends.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The underlying legacy cursor failed.
    #[error("cannot read legacy identities: {0}")]
    Cursor(#[from] CursorError),
}

// ---------------------------------------------------------------------------
// Database errors
// ---------------------------------------------------------------------------

/// Errors from the SQLite persistence layer.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Underlying rusqlite error.
    #[error("database error: {0}")]
    SqliteError(#[from] rusqlite::Error),

    /// A migration failed.
    #[error("database migration failed (version {version}): {detail}")]
    MigrationFailed { version: u32, detail: String },

    /// A stored column could not be encoded or decoded.
    #[error("cannot encode column '{column}': {detail}")]
    Encoding { column: String, detail: String },
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Migration errors
// ---------------------------------------------------------------------------

/// Errors that abort a migration run.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// The source stopped with an error.
    #[error("migration source failed after {copied} identities: {source}")]
    Source {
        copied: u64,
        #[source]
        source: SourceError,
    },

    /// Writing an identity to the destination failed.
    #[error("cannot store identity {username} ({provider_id}): {source}")]
    Store {
        username: String,
        provider_id: String,
        #[source]
        source: DatabaseError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = ConvertError::UnrecognizedExternalId {
            external_id: "ldap:cn=bob".into(),
        };
        assert_eq!(err.to_string(), "unrecognised external ID \"ldap:cn=bob\"");

        let err = ConvertError::UnrecognizedOwner {
            username: "bob".into(),
            owner: "root@idm".into(),
        };
        assert_eq!(err.to_string(), "unrecognised owner for bob (\"root@idm\")");

        let err = ConvertError::Undecodable {
            position: 7,
            detail: "missing field `username`".into(),
        };
        assert!(err.to_string().contains("position 7"));

        let err = ConfigError::InvalidValue {
            field: "migration.progress_interval".into(),
            detail: "must be > 0".into(),
        };
        assert!(err.to_string().contains("progress_interval"));
    }

    #[test]
    fn test_source_error_wraps_cursor_cause() {
        let err: SourceError = CursorError::Other("connection reset".into()).into();
        assert_eq!(
            err.to_string(),
            "cannot read legacy identities: connection reset"
        );
        assert!(std::error::Error::source(&err).is_some());
    }
}
