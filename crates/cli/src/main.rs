//! idmigrate command-line tool.
//!
//! Provides subcommands for running a legacy identity migration, checking how
//! a legacy account would be classified, and generating / validating
//! configuration files.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use idmigrate_core::config::{LegacyKind, MigrateConfig};
use idmigrate_core::legacy::{DumpFile, LegacyDatabase};
use idmigrate_core::{
    classify, Database, IdentityStore, LegacySource, MigrationSummary, Migrator, NullStore,
};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// idmigrate command-line tool.
#[derive(Parser, Debug)]
#[command(
    name = "idmigrate",
    version,
    about = "Migrate legacy identity documents into the canonical identity store"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Copy every legacy identity into the destination store.
    Migrate {
        /// Read legacy identities from this SQLite database.
        #[arg(long, conflicts_with = "dump")]
        legacy_db: Option<PathBuf>,

        /// Read legacy identities from this JSON-lines dump.
        #[arg(long)]
        dump: Option<PathBuf>,

        /// Destination SQLite database.
        #[arg(long)]
        dest: Option<PathBuf>,

        /// Convert and count identities without writing them.
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the provider ID a legacy account would be migrated to.
    Classify {
        /// Legacy username.
        username: String,

        /// Legacy external ID (empty for accounts created in the identity manager).
        #[arg(default_value = "")]
        external_id: String,
    },

    /// Count identities in the destination store.
    Count {
        /// Destination SQLite database.
        #[arg(long)]
        dest: Option<PathBuf>,
    },

    /// Generate a default configuration file.
    Init {
        /// Output path for the generated config file.
        #[arg(short, long, default_value = "./idmigrate.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file.
    Validate,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&config.migration.log_level);

    match run(cli.command, config, cli.config.as_deref()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Install the tracing subscriber; `RUST_LOG` takes precedence over the
/// configured level.
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn run(command: Commands, config: MigrateConfig, config_path: Option<&Path>) -> Result<()> {
    match command {
        Commands::Migrate {
            legacy_db,
            dump,
            dest,
            dry_run,
        } => {
            let mut config = config;
            if let Some(path) = legacy_db {
                config.legacy.kind = LegacyKind::Sqlite;
                config.legacy.path = path;
            }
            if let Some(path) = dump {
                config.legacy.kind = LegacyKind::Dump;
                config.legacy.path = path;
            }
            if let Some(path) = dest {
                config.destination.path = path;
            }
            config.migration.dry_run |= dry_run;
            cmd_migrate(&config)
        }
        Commands::Classify {
            username,
            external_id,
        } => cmd_classify(&username, &external_id),
        Commands::Count { dest } => {
            let path = dest.unwrap_or(config.destination.path);
            cmd_count(&path)
        }
        Commands::Init { output } => cmd_init(&output),
        Commands::Validate => {
            let path = config_path.context("validate requires --config")?;
            cmd_validate(path)
        }
    }
}

// ---------------------------------------------------------------------------
// Config helpers
// ---------------------------------------------------------------------------

fn load_config(path: Option<&Path>) -> Result<MigrateConfig> {
    match path {
        Some(path) => {
            MigrateConfig::load_from_file(path).context("failed to load configuration file")
        }
        None => Ok(MigrateConfig::default()),
    }
}

fn open_destination(path: &Path) -> Result<Database> {
    let db = Database::new(path).context("failed to open destination database")?;
    db.initialize()
        .context("failed to initialize destination database")?;
    Ok(db)
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

fn cmd_migrate(config: &MigrateConfig) -> Result<()> {
    config.validate().context("invalid migration settings")?;

    let migrator = Migrator::new(&config.migration);
    info!(
        source = %config.source_label(),
        destination = %config.destination.path.display(),
        dry_run = migrator.is_dry_run(),
        "migrating identities"
    );

    let summary = if migrator.is_dry_run() {
        run_from_legacy(config, &migrator, &NullStore)?
    } else {
        let started = Utc::now();
        let dest = open_destination(&config.destination.path)?;
        let summary = run_from_legacy(config, &migrator, &dest)?;
        dest.insert_migration_run(&summary.to_run(config.source_label(), started))
            .context("failed to record migration run")?;
        summary
    };

    print_summary(&summary, migrator.is_dry_run());
    Ok(())
}

/// Open the configured legacy collection and stream it into `store`.
fn run_from_legacy<T: IdentityStore>(
    config: &MigrateConfig,
    migrator: &Migrator,
    store: &T,
) -> Result<MigrationSummary> {
    let summary = match config.legacy.kind {
        LegacyKind::Sqlite => {
            let legacy = LegacyDatabase::open_read_only(&config.legacy.path)
                .context("failed to open legacy database")?;
            migrator.run(&mut LegacySource::new(&legacy), store)
        }
        LegacyKind::Dump => {
            let dump = DumpFile::new(&config.legacy.path);
            migrator.run(&mut LegacySource::new(&dump), store)
        }
    };
    summary.context("migration failed")
}

fn print_summary(summary: &MigrationSummary, dry_run: bool) {
    println!(
        "Migration {}",
        if dry_run { "dry run complete" } else { "complete" }
    );
    println!("  Copied  : {}", summary.copied);
    println!("  Updated : {}", summary.updated);
    println!("  Skipped : {}", summary.skipped);
    if summary.skipped > 0 {
        println!();
        println!("Skipped records are listed in the log output above.");
    }
}

fn cmd_classify(username: &str, external_id: &str) -> Result<()> {
    match classify(username, external_id) {
        Some(provider_id) => {
            println!("{}", provider_id);
            Ok(())
        }
        None => anyhow::bail!("unrecognised external ID {:?}", external_id),
    }
}

fn cmd_count(path: &Path) -> Result<()> {
    let db = open_destination(path)?;
    let count = db.count_identities().context("failed to count identities")?;
    println!("{}", count);
    if let Some(run) = db
        .last_migration_run()
        .context("failed to read migration log")?
    {
        println!(
            "Last migration: {} ({} copied, {} skipped) at {}",
            run.source,
            run.copied,
            run.skipped,
            run.completed_at.to_rfc3339()
        );
    }
    Ok(())
}

fn cmd_init(output: &Path) -> Result<()> {
    let default_config = r#"# idmigrate configuration

[legacy]
# "sqlite" for a legacy database, "dump" for a JSON-lines export.
kind = "sqlite"
path = "/var/lib/idm/legacy.db"

[destination]
path = "/var/lib/idm/identities.db"

[migration]
dry_run = false
progress_interval = 1000
log_level = "info"
"#;

    if output.exists() {
        anyhow::bail!(
            "file already exists: {}. Use a different path or remove the existing file.",
            output.display()
        );
    }

    std::fs::write(output, default_config).context("failed to write config file")?;

    println!("Default configuration written to {}", output.display());
    println!();
    println!("Next steps:");
    println!("  1. Edit the legacy and destination paths");
    println!(
        "  2. Validate with: idmigrate validate --config {}",
        output.display()
    );
    println!(
        "  3. Try a dry run: idmigrate migrate --dry-run --config {}",
        output.display()
    );

    Ok(())
}

fn cmd_validate(config_path: &Path) -> Result<()> {
    println!("Validating configuration: {}", config_path.display());
    println!();

    let config =
        MigrateConfig::load_from_file(config_path).context("failed to parse configuration")?;
    println!("  [OK] TOML structure is valid");

    match config.validate() {
        Ok(()) => {
            println!("  [OK] All required fields are valid");
        }
        Err(e) => {
            println!("  [FAIL] Validation error: {}", e);
            anyhow::bail!("configuration validation failed");
        }
    }

    let legacy_found = config.legacy.path.exists();
    println!();
    println!("Configuration summary:");
    println!("  Legacy source : {}", config.source_label());
    println!(
        "  Legacy exists : {}",
        if legacy_found { "yes" } else { "NOT FOUND" }
    );
    if legacy_found && config.legacy.kind == LegacyKind::Sqlite {
        match LegacyDatabase::open_read_only(&config.legacy.path)
            .and_then(|db| db.count_documents())
        {
            Ok(count) => println!("  Documents     : {}", count),
            Err(e) => println!("  Documents     : unreadable ({})", e),
        }
    }
    println!("  Destination   : {}", config.destination.path.display());
    println!("  Dry run       : {}", config.migration.dry_run);
    println!("  Progress every: {}", config.migration.progress_interval);
    println!();
    println!("Configuration is valid.");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn migrate_flags_override_config() {
        let cli = Cli::try_parse_from([
            "idmigrate",
            "migrate",
            "--dump",
            "/tmp/identities.jsonl",
            "--dry-run",
        ])
        .unwrap();
        match cli.command {
            Commands::Migrate { dump, dry_run, legacy_db, .. } => {
                assert_eq!(dump, Some(PathBuf::from("/tmp/identities.jsonl")));
                assert!(dry_run);
                assert!(legacy_db.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn legacy_db_and_dump_conflict() {
        let result = Cli::try_parse_from([
            "idmigrate",
            "migrate",
            "--legacy-db",
            "a.db",
            "--dump",
            "b.jsonl",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn classify_defaults_external_id_to_empty() {
        let cli = Cli::try_parse_from(["idmigrate", "classify", "alice"]).unwrap();
        match cli.command {
            Commands::Classify { username, external_id } => {
                assert_eq!(username, "alice");
                assert_eq!(external_id, "");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    fn dump_config(dir: &Path, dry_run: bool) -> MigrateConfig {
        let dump = dir.join("identities.jsonl");
        std::fs::write(
            &dump,
            "{\"username\":\"alice\"}\nnot json\n{\"username\":\"bob\"}\n",
        )
        .unwrap();

        let mut config = MigrateConfig::default();
        config.legacy.kind = LegacyKind::Dump;
        config.legacy.path = dump;
        config.destination.path = dir.join("identities.db");
        config.migration.dry_run = dry_run;
        config
    }

    #[test]
    fn dry_run_leaves_destination_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let config = dump_config(dir.path(), true);

        cmd_migrate(&config).unwrap();
        assert!(!config.destination.path.exists());
    }

    #[test]
    fn migrate_writes_identities_and_run_log() {
        let dir = tempfile::tempdir().unwrap();
        let config = dump_config(dir.path(), false);

        cmd_migrate(&config).unwrap();
        let db = Database::new(&config.destination.path).unwrap();
        assert_eq!(db.count_identities().unwrap(), 2);
        let run = db.last_migration_run().unwrap().unwrap();
        assert_eq!((run.copied, run.skipped), (2, 1));
        assert_eq!(run.source, config.source_label());
    }

    #[test]
    fn init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("idmigrate.toml");
        cmd_init(&path).unwrap();
        assert!(cmd_init(&path).is_err());

        let config = MigrateConfig::load_and_validate(&path).unwrap();
        assert_eq!(config.legacy.kind, LegacyKind::Sqlite);
    }
}
