//! Typed query helpers for the destination database.

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::Database;
use crate::errors::DatabaseError;
use crate::models::{Identity, ProviderIdentity};

// ---------------------------------------------------------------------------
// Domain structs returned by queries
// ---------------------------------------------------------------------------

/// Whether an upsert created a new row or replaced an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// A row from the `migration_runs` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRun {
    pub source: String,
    pub copied: u64,
    pub skipped: u64,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

const IDENTITY_COLUMNS: &str = "provider_id, username, name, email, group_names, public_keys, \
     last_login, last_discharge, provider_info, extra_info";

// ---------------------------------------------------------------------------
// Query implementations
// ---------------------------------------------------------------------------

impl Database {
    // -- identities ---------------------------------------------------------

    /// Insert `identity`, or overwrite the row with the same provider ID.
    pub fn upsert_identity(&self, identity: &Identity) -> Result<UpsertOutcome, DatabaseError> {
        let groups = encode_json("group_names", &identity.groups)?;
        let keys = encode_json("public_keys", &identity.public_keys)?;
        let provider_info = encode_json("provider_info", &identity.provider_info)?;
        let extra_info = encode_json("extra_info", &identity.extra_info)?;
        let now = Utc::now().to_rfc3339();

        let conn = self.conn();
        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM identities WHERE provider_id = ?1",
                params![identity.provider_id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        conn.execute(
            "INSERT INTO identities (provider_id, username, name, email, group_names, public_keys,
                                     last_login, last_discharge, provider_info, extra_info, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(provider_id) DO UPDATE SET
                username = excluded.username,
                name = excluded.name,
                email = excluded.email,
                group_names = excluded.group_names,
                public_keys = excluded.public_keys,
                last_login = excluded.last_login,
                last_discharge = excluded.last_discharge,
                provider_info = excluded.provider_info,
                extra_info = excluded.extra_info,
                updated_at = excluded.updated_at",
            params![
                identity.provider_id.as_str(),
                identity.username,
                identity.name,
                identity.email,
                groups,
                keys,
                identity.last_login.to_rfc3339(),
                identity.last_discharge.to_rfc3339(),
                provider_info,
                extra_info,
                now,
            ],
        )?;

        let outcome = match existing {
            Some(_) => UpsertOutcome::Updated,
            None => UpsertOutcome::Inserted,
        };
        debug!(
            provider_id = %identity.provider_id,
            username = %identity.username,
            ?outcome,
            "stored identity"
        );
        Ok(outcome)
    }

    /// Look up an identity by provider ID.
    pub fn get_identity(
        &self,
        provider_id: &ProviderIdentity,
    ) -> Result<Option<Identity>, DatabaseError> {
        let conn = self.conn();
        let identity = conn
            .query_row(
                &format!("SELECT {IDENTITY_COLUMNS} FROM identities WHERE provider_id = ?1"),
                params![provider_id.as_str()],
                row_to_identity,
            )
            .optional()?;
        Ok(identity)
    }

    /// Return up to `limit` identities in insertion order.
    pub fn list_identities(&self, limit: u32) -> Result<Vec<Identity>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {IDENTITY_COLUMNS} FROM identities ORDER BY id LIMIT ?1"
        ))?;
        let identities = stmt
            .query_map(params![limit], row_to_identity)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(identities)
    }

    /// Total number of stored identities.
    pub fn count_identities(&self) -> Result<i64, DatabaseError> {
        let conn = self.conn();
        let count = conn.query_row("SELECT COUNT(*) FROM identities", [], |row| row.get(0))?;
        Ok(count)
    }

    // -- migration_runs -----------------------------------------------------

    /// Record the outcome of a migration run.
    pub fn insert_migration_run(&self, run: &MigrationRun) -> Result<i64, DatabaseError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO migration_runs (source, copied, skipped, started_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                run.source,
                run.copied as i64,
                run.skipped as i64,
                run.started_at.to_rfc3339(),
                run.completed_at.to_rfc3339(),
            ],
        )?;
        let id = conn.last_insert_rowid();
        debug!(id, source = %run.source, "recorded migration run");
        Ok(id)
    }

    /// The most recently recorded migration run.
    pub fn last_migration_run(&self) -> Result<Option<MigrationRun>, DatabaseError> {
        let conn = self.conn();
        let run = conn
            .query_row(
                "SELECT source, copied, skipped, started_at, completed_at
                 FROM migration_runs ORDER BY id DESC LIMIT 1",
                [],
                |row| {
                    Ok(MigrationRun {
                        source: row.get(0)?,
                        copied: row.get::<_, i64>(1)? as u64,
                        skipped: row.get::<_, i64>(2)? as u64,
                        started_at: parse_timestamp(row, 3)?,
                        completed_at: parse_timestamp(row, 4)?,
                    })
                },
            )
            .optional()?;
        Ok(run)
    }
}

// ---------------------------------------------------------------------------
// Column encoding
// ---------------------------------------------------------------------------

fn encode_json<T: Serialize>(column: &str, value: &T) -> Result<String, DatabaseError> {
    serde_json::to_string(value).map_err(|e| DatabaseError::Encoding {
        column: column.into(),
        detail: e.to_string(),
    })
}

fn decode_json<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_identity(row: &Row<'_>) -> rusqlite::Result<Identity> {
    Ok(Identity {
        provider_id: ProviderIdentity::from_raw(row.get::<_, String>(0)?),
        username: row.get(1)?,
        name: row.get(2)?,
        email: row.get(3)?,
        groups: decode_json(row, 4)?,
        public_keys: decode_json(row, 5)?,
        last_login: parse_timestamp(row, 6)?,
        last_discharge: parse_timestamp(row, 7)?,
        provider_info: decode_json(row, 8)?,
        extra_info: decode_json(row, 9)?,
    })
}
