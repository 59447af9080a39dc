//! Closing use-case service.
//!
//! # Responsibility
//! - Sequence Build -> snapshot write -> Purge for one year (the Closing
//!   Orchestrator) and own the `open -> closing -> closed` transition.
//! - Expose revert, archive deletion, budget, status and reconciliation.
//! - Emit one `key=value` log line per operation outcome.
//!
//! # Invariants
//! - The snapshot and the `closing` status are committed, with a `Create`
//!   precondition on the snapshot, before any purge batch is issued.
//! - A failed snapshot write leaves live collections untouched.
//! - A failure after the snapshot write leaves the year in `closing`;
//!   `reconcile_annual_closing` completes it.

use crate::closing::status::control_fields;
use crate::closing::{
    build_archive, delete_archive, load_status, purge, reconcile_year, revert_year,
    ArchiveDeletion, ClosingError, ClosingResult, ReconcileReport, RevertBudget, RevertOutcome,
};
use crate::config::CoreConfig;
use crate::model::closing::ClosingStatus;
use crate::model::document::{DocKey, SourceCollection, ANNUAL_CLOSINGS};
use crate::model::snapshot::ArchivalSnapshot;
use crate::store::{DocumentStore, StoreError, WriteBatch};
use log::{error, info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Instant;

/// Result of a successful closing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosingOutcome {
    pub year: i32,
    pub archived_count: usize,
    pub counts: BTreeMap<SourceCollection, usize>,
    pub purge_batches: usize,
}

/// Listing entry for one live archive; carries no record payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveSummary {
    pub year: i32,
    pub created_at: i64,
    pub counts: BTreeMap<SourceCollection, usize>,
    pub total: usize,
}

/// Stored archive that could not be parsed; reported instead of listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadableArchive {
    pub id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveListing {
    pub archives: Vec<ArchiveSummary>,
    pub unreadable: Vec<UnreadableArchive>,
}

/// Entry point for every annual closing operation.
pub struct ClosingService<S: DocumentStore> {
    store: S,
    config: CoreConfig,
}

impl<S: DocumentStore> ClosingService<S> {
    /// Creates a service with default configuration.
    pub fn new(store: S) -> Self {
        Self::with_config(store, CoreConfig::default())
    }

    pub fn with_config(store: S, config: CoreConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Archives every record of `year` and purges the originals.
    ///
    /// # Errors
    /// - `AlreadyClosed` when the year is `closing`/`closed`, or another
    ///   caller created the snapshot first.
    /// - `NothingToArchive` when the year has no record; nothing is written.
    /// - `Storage` for store failures; if it happens after the snapshot
    ///   write, the year stays `closing`.
    pub fn perform_annual_closing(&self, year: i32) -> ClosingResult<ClosingOutcome> {
        let started_at = Instant::now();
        info!("event=annual_closing module=closing status=start year={year}");
        let result = self.close_year(year);
        log_result("annual_closing", year, started_at, &result, |outcome| {
            format!(
                "archived={} purge_batches={}",
                outcome.archived_count, outcome.purge_batches
            )
        });
        result
    }

    /// Restores `year` from its snapshot and spends one revert.
    pub fn revert_annual_closing(&self, year: i32) -> ClosingResult<RevertOutcome> {
        let started_at = Instant::now();
        info!("event=annual_revert module=closing status=start year={year}");
        let result = revert_year(&self.store, self.config.revert_ceiling, year, now_ms());
        log_result("annual_revert", year, started_at, &result, |outcome| {
            format!(
                "restored={} remaining_reverts={}",
                outcome.restored_count, outcome.remaining_reverts
            )
        });
        result
    }

    /// Discards the snapshot of `year` without restoring data.
    pub fn delete_closing_archive(&self, year: i32) -> ClosingResult<ArchiveDeletion> {
        let started_at = Instant::now();
        let result = delete_archive(&self.store, year, now_ms());
        log_result("archive_delete", year, started_at, &result, |outcome| {
            format!("existed={}", outcome.existed)
        });
        result
    }

    /// Finishes an interrupted purge and reports stragglers for `year`.
    pub fn reconcile_annual_closing(&self, year: i32) -> ClosingResult<ReconcileReport> {
        let started_at = Instant::now();
        let result = reconcile_year(&self.store, year, now_ms());
        log_result("closing_reconcile", year, started_at, &result, |report| {
            format!(
                "purged={} stragglers={}",
                report.purged_count,
                report.stragglers.len()
            )
        });
        result
    }

    /// Remaining reverts; initializes the counter on first use.
    pub fn revert_count(&self) -> ClosingResult<u32> {
        self.budget().get_count()
    }

    /// Spends one revert outside of a restore.
    pub fn decrement_revert_count(&self) -> ClosingResult<u32> {
        self.budget().decrement()
    }

    pub fn closing_status(&self, year: i32) -> ClosingResult<ClosingStatus> {
        load_status(&self.store, year)
    }

    /// Lists live archives ordered by year.
    ///
    /// A malformed archive is reported under `unreadable` and does not hide
    /// the others.
    pub fn list_archives(&self) -> ClosingResult<ArchiveListing> {
        let mut listing = ArchiveListing::default();
        for document in self.store.list(ANNUAL_CLOSINGS)? {
            match ArchivalSnapshot::from_document(&document) {
                Ok(snapshot) => listing.archives.push(ArchiveSummary {
                    year: snapshot.year,
                    created_at: snapshot.created_at,
                    counts: snapshot.counts(),
                    total: snapshot.total_records(),
                }),
                Err(reason) => {
                    warn!(
                        "event=archive_list module=closing status=unreadable archive_id={} error={}",
                        document.id, reason
                    );
                    listing.unreadable.push(UnreadableArchive {
                        id: document.id,
                        reason,
                    });
                }
            }
        }
        listing.archives.sort_by_key(|summary| summary.year);
        Ok(listing)
    }

    fn budget(&self) -> RevertBudget<&S> {
        RevertBudget::new(&self.store, self.config.revert_ceiling)
    }

    fn close_year(&self, year: i32) -> ClosingResult<ClosingOutcome> {
        let status = load_status(&self.store, year)?;
        if !status.can_close() {
            return Err(ClosingError::AlreadyClosed { year, status });
        }

        let plan = build_archive(&self.store, year)?;
        let archived_count = plan.total_count;
        let counts = plan.counts();
        let now = now_ms();
        let (snapshot, purge_keys) = plan.into_snapshot(now);
        let snapshot_document = snapshot.to_document()?;

        let mut batch = WriteBatch::new();
        batch
            .create(DocKey::annual_closing(year), snapshot_document.fields)
            .set(
                DocKey::closing_status(year),
                control_fields(year, ClosingStatus::Closing, archived_count as u64, now)?,
            );
        match self.store.commit(&batch) {
            Ok(()) => {}
            Err(StoreError::AlreadyExists(_)) => {
                return Err(ClosingError::AlreadyClosed {
                    year,
                    status: ClosingStatus::Closing,
                });
            }
            Err(err) => return Err(err.into()),
        }

        let report = purge(&self.store, &purge_keys)?;

        let mut batch = WriteBatch::new();
        batch.set(
            DocKey::closing_status(year),
            control_fields(year, ClosingStatus::Closed, archived_count as u64, now_ms())?,
        );
        self.store.commit(&batch)?;

        Ok(ClosingOutcome {
            year,
            archived_count,
            counts,
            purge_batches: report.batches,
        })
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn log_result<T>(
    event: &str,
    year: i32,
    started_at: Instant,
    result: &ClosingResult<T>,
    describe: impl FnOnce(&T) -> String,
) {
    let duration_ms = started_at.elapsed().as_millis();
    match result {
        Ok(value) => info!(
            "event={} module=closing status=ok year={} duration_ms={} {}",
            event,
            year,
            duration_ms,
            describe(value)
        ),
        Err(err @ ClosingError::Storage(_)) | Err(err @ ClosingError::InvalidData(_)) => error!(
            "event={} module=closing status=error year={} duration_ms={} error_code={} error={}",
            event,
            year,
            duration_ms,
            err.kind().as_str(),
            err
        ),
        Err(err) => warn!(
            "event={} module=closing status=rejected year={} duration_ms={} error_code={} error={}",
            event,
            year,
            duration_ms,
            err.kind().as_str(),
            err
        ),
    }
}
