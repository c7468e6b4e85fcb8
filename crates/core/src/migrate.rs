//! Copying identities from a [`Source`] into an [`IdentityStore`].

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::config::MigrationConfig;
use crate::errors::MigrationError;
use crate::source::Source;
use crate::store::{IdentityStore, MigrationRun, UpsertOutcome};

/// Counts reported at the end of a migration run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationSummary {
    /// Identities read from the source (and written unless dry-run).
    pub copied: u64,
    /// Of `copied`, how many replaced an existing destination identity.
    pub updated: u64,
    /// Documents the source dropped as unconvertible.
    pub skipped: u64,
}

/// Drives a migration run.
#[derive(Debug, Clone)]
pub struct Migrator {
    dry_run: bool,
    progress_interval: u64,
}

impl Migrator {
    pub fn new(config: &MigrationConfig) -> Self {
        Self {
            dry_run: config.dry_run,
            progress_interval: config.progress_interval.max(1),
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Drain `source` into `store`.
    ///
    /// The run stops at the first store failure or source error.
    pub fn run<S, T>(&self, source: &mut S, store: &T) -> Result<MigrationSummary, MigrationError>
    where
        S: Source + ?Sized,
        T: IdentityStore + ?Sized,
    {
        info!(dry_run = self.dry_run, "starting identity migration");
        let mut summary = MigrationSummary::default();

        while source.advance() {
            let Some(identity) = source.identity() else {
                continue;
            };
            if self.dry_run {
                debug!(
                    username = %identity.username,
                    provider_id = %identity.provider_id,
                    "dry run, not storing identity"
                );
            } else {
                let outcome = store
                    .upsert_identity(identity)
                    .map_err(|e| MigrationError::Store {
                        username: identity.username.clone(),
                        provider_id: identity.provider_id.to_string(),
                        source: e,
                    })?;
                if outcome == UpsertOutcome::Updated {
                    summary.updated += 1;
                }
            }
            summary.copied += 1;
            if summary.copied % self.progress_interval == 0 {
                info!(copied = summary.copied, "migration progress");
            }
        }

        if let Some(e) = source.take_err() {
            return Err(MigrationError::Source {
                copied: summary.copied,
                source: e,
            });
        }

        summary.skipped = source.skipped();
        info!(
            copied = summary.copied,
            updated = summary.updated,
            skipped = summary.skipped,
            "identity migration complete"
        );
        Ok(summary)
    }
}

impl MigrationSummary {
    /// Build the run-log row for this summary.
    pub fn to_run(&self, source: impl Into<String>, started_at: DateTime<Utc>) -> MigrationRun {
        MigrationRun {
            source: source.into(),
            copied: self.copied,
            skipped: self.skipped,
            started_at,
            completed_at: Utc::now(),
        }
    }
}
