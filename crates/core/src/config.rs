//! TOML-based configuration for idmigrate.
//!
//! A config file names the legacy collection to read, the destination
//! database to write, and how the run behaves. Every section has defaults so
//! the CLI can fill in or override paths from flags.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::ConfigError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level migration configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MigrateConfig {
    /// Where legacy identities are read from.
    #[serde(default)]
    pub legacy: LegacyConfig,

    /// Where canonical identities are written.
    #[serde(default)]
    pub destination: DestinationConfig,

    /// Run behaviour.
    #[serde(default)]
    pub migration: MigrationConfig,
}

// ---------------------------------------------------------------------------
// Legacy source
// ---------------------------------------------------------------------------

/// Kind of legacy collection.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LegacyKind {
    /// SQLite database with an `identities` document table.
    #[default]
    Sqlite,
    /// JSON-lines export, one document per line.
    Dump,
}

impl std::fmt::Display for LegacyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite => write!(f, "sqlite"),
            Self::Dump => write!(f, "dump"),
        }
    }
}

/// Legacy collection settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LegacyConfig {
    #[serde(default)]
    pub kind: LegacyKind,

    /// Path to the legacy database or dump file.
    #[serde(default)]
    pub path: PathBuf,
}

// ---------------------------------------------------------------------------
// Destination
// ---------------------------------------------------------------------------

/// Destination store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationConfig {
    /// Path to the destination SQLite database (created if missing).
    #[serde(default = "default_destination_path")]
    pub path: PathBuf,
}

fn default_destination_path() -> PathBuf {
    PathBuf::from("identities.db")
}

impl Default for DestinationConfig {
    fn default() -> Self {
        Self {
            path: default_destination_path(),
        }
    }
}

// ---------------------------------------------------------------------------
// Run behaviour
// ---------------------------------------------------------------------------

/// Migration run settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Convert and count identities without writing them.
    #[serde(default)]
    pub dry_run: bool,

    /// Log a progress line every this many identities.
    #[serde(default = "default_progress_interval")]
    pub progress_interval: u64,

    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_progress_interval() -> u64 {
    1000
}
fn default_log_level() -> String {
    "info".into()
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            progress_interval: default_progress_interval(),
            log_level: default_log_level(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & validation
// ---------------------------------------------------------------------------

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl MigrateConfig {
    /// Load a [`MigrateConfig`] from a TOML file at the given path.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: MigrateConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Validate that all required fields are present and sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.legacy.path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "legacy.path".into(),
                detail: "legacy path must not be empty".into(),
            });
        }
        if self.destination.path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "destination.path".into(),
                detail: "destination path must not be empty".into(),
            });
        }
        if self.legacy.path == self.destination.path {
            return Err(ConfigError::InvalidValue {
                field: "destination.path".into(),
                detail: "destination must differ from the legacy source".into(),
            });
        }
        if self.migration.progress_interval == 0 {
            return Err(ConfigError::InvalidValue {
                field: "migration.progress_interval".into(),
                detail: "progress interval must be > 0".into(),
            });
        }
        if !LOG_LEVELS.contains(&self.migration.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "migration.log_level".into(),
                detail: format!("expected one of {}", LOG_LEVELS.join(", ")),
            });
        }

        Ok(())
    }

    /// Convenience: load and validate in one call.
    pub fn load_and_validate<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load_from_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Human-readable name of the legacy source, e.g. `sqlite:/srv/legacy.db`.
    pub fn source_label(&self) -> String {
        format!("{}:{}", self.legacy.kind, self.legacy.path.display())
    }
}
