//! idmigrate core library.
//!
//! This crate converts identity documents from the legacy identity collection
//! into canonical identities and streams them into a destination store:
//! external-ID classification, record conversion, legacy cursors, the
//! streaming source, the destination database, and the migration driver.

pub mod classify;
pub mod config;
pub mod convert;
pub mod errors;
pub mod legacy;
pub mod migrate;
pub mod models;
pub mod source;
pub mod store;

// Re-exports for convenience.
pub use classify::classify;
pub use config::MigrateConfig;
pub use convert::convert;
pub use migrate::{MigrationSummary, Migrator};
pub use models::{Identity, LegacyIdentity, ProviderIdentity, PublicKey};
pub use source::{DiagnosticSink, LegacySource, Source, TracingSink};
pub use store::{Database, IdentityStore, NullStore};
