//! Destination schema, versioned through SQLite's `user_version` pragma.
//!
//! Each migration runs in its own transaction together with the version bump,
//! so a failed step leaves the previous version intact.

use rusqlite::Connection;
use tracing::{debug, info};

use crate::errors::DatabaseError;

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "identities",
        sql: r#"
        CREATE TABLE IF NOT EXISTS identities (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            provider_id     TEXT NOT NULL UNIQUE,
            username        TEXT NOT NULL,
            name            TEXT NOT NULL DEFAULT '',
            email           TEXT NOT NULL DEFAULT '',
            group_names     TEXT NOT NULL DEFAULT '[]',
            public_keys     TEXT NOT NULL DEFAULT '[]',
            last_login      TEXT NOT NULL,
            last_discharge  TEXT NOT NULL,
            provider_info   TEXT NOT NULL DEFAULT '{}',
            extra_info      TEXT NOT NULL DEFAULT '{}',
            updated_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_identities_username ON identities (username);
        "#,
    },
    Migration {
        version: 2,
        name: "migration run log",
        sql: r#"
        CREATE TABLE IF NOT EXISTS migration_runs (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            source        TEXT NOT NULL,
            copied        INTEGER NOT NULL DEFAULT 0,
            skipped       INTEGER NOT NULL DEFAULT 0,
            started_at    TEXT NOT NULL,
            completed_at  TEXT NOT NULL
        );
        "#,
    },
];

/// Apply every migration newer than the stored schema version.
pub fn run_migrations(conn: &mut Connection) -> Result<(), DatabaseError> {
    let applied = schema_version(conn)?;
    for migration in MIGRATIONS.iter().filter(|m| m.version > applied) {
        info!(
            version = migration.version,
            name = migration.name,
            "applying schema migration"
        );
        let tx = conn.transaction()?;
        tx.execute_batch(migration.sql)
            .map_err(|e| DatabaseError::MigrationFailed {
                version: migration.version,
                detail: e.to_string(),
            })?;
        tx.pragma_update(None, "user_version", migration.version)?;
        tx.commit()?;
    }
    debug!(version = schema_version(conn)?, "schema version");
    Ok(())
}

fn schema_version(conn: &Connection) -> Result<u32, DatabaseError> {
    let version: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_run_idempotently() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();
        run_migrations(&mut conn).unwrap();
        assert_eq!(schema_version(&conn).unwrap(), 2);
    }

    #[test]
    fn test_tables_created() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();

        let tables: Vec<String> = {
            let mut stmt = conn
                .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
                .unwrap();
            stmt.query_map([], |row| row.get(0))
                .unwrap()
                .filter_map(|r| r.ok())
                .collect()
        };

        assert!(tables.contains(&"identities".to_string()));
        assert!(tables.contains(&"migration_runs".to_string()));
    }
}
