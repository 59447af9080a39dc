//! Reconciliation: idempotent re-scan of a closed year.
//!
//! The build read and the purge deletes are not one transaction. This pass
//! finishes an interrupted purge and reports records that entered the year
//! window after the snapshot was built.

use crate::closing::error::{ClosingError, ClosingResult};
use crate::closing::purge::purge;
use crate::closing::status::{control_fields, load_control};
use crate::model::closing::ClosingStatus;
use crate::model::document::{DocKey, SourceCollection};
use crate::model::snapshot::{ArchivalSnapshot, YearWindow};
use crate::store::{DocumentStore, WriteBatch};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub year: i32,
    pub status_before: ClosingStatus,
    pub status_after: ClosingStatus,
    /// Archived records that were still live and have now been deleted.
    pub purged_count: usize,
    /// Live in-window records missing from the snapshot; left untouched.
    pub stragglers: Vec<DocKey>,
}

/// Re-scans `year` against its snapshot.
///
/// A snapshot without a control record is adopted as `closing`. A year left
/// `reverting` is rolled back: restored records are purged again and the
/// snapshot stays the only copy, so the year returns to `closed` with its
/// budget untouched.
///
/// # Errors
/// - `ArchiveNotFound` when the year has no snapshot.
pub fn reconcile_year<S: DocumentStore + ?Sized>(
    store: &S,
    year: i32,
    now_ms: i64,
) -> ClosingResult<ReconcileReport> {
    let document = store
        .get(&DocKey::annual_closing(year))?
        .ok_or(ClosingError::ArchiveNotFound { year })?;
    let snapshot = ArchivalSnapshot::from_document(&document).map_err(ClosingError::InvalidData)?;
    let status_before = match load_control(store, year)? {
        Some(control) if control.status.has_archive() => control.status,
        _ => ClosingStatus::Closing,
    };

    let archived: BTreeSet<DocKey> = snapshot.keys().collect();
    let mut still_live = Vec::new();
    for key in &archived {
        if store.get(key)?.is_some() {
            still_live.push(key.clone());
        }
    }
    let purged_count = purge(store, &still_live)?.deleted;

    let window = YearWindow::for_year(year).ok_or_else(|| ClosingError::InvalidYear {
        year,
        reason: "year is outside the supported calendar range".to_string(),
    })?;
    let mut stragglers = Vec::new();
    for collection in SourceCollection::ALL {
        for document in
            store.query_created_between(collection.as_str(), window.start_ms, window.end_ms)?
        {
            let key = DocKey::source(collection, document.id);
            if !archived.contains(&key) {
                stragglers.push(key);
            }
        }
    }

    if status_before != ClosingStatus::Closed {
        let mut batch = WriteBatch::new();
        batch.set(
            DocKey::closing_status(year),
            control_fields(
                year,
                ClosingStatus::Closed,
                snapshot.total_records() as u64,
                now_ms,
            )?,
        );
        store.commit(&batch)?;
    }

    Ok(ReconcileReport {
        year,
        status_before,
        status_after: ClosingStatus::Closed,
        purged_count,
        stragglers,
    })
}
