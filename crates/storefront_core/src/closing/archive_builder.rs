//! Archive Builder: the only place deciding what "belongs to year Y".
//!
//! # Invariants
//! - Read-only; never mutates the store.
//! - A plan always holds at least one record.

use crate::closing::error::{ClosingError, ClosingResult};
use crate::model::document::{DocKey, SourceCollection};
use crate::model::snapshot::{ArchivalSnapshot, ArchivedRecord, YearWindow};
use crate::store::DocumentStore;
use log::debug;
use std::collections::BTreeMap;

/// Records selected for one year, ready to be written and purged.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchivePlan {
    pub window: YearWindow,
    pub collections: BTreeMap<SourceCollection, Vec<ArchivedRecord>>,
    /// Live keys of every selected record, in archive order.
    pub purge_keys: Vec<DocKey>,
    pub total_count: usize,
}

impl ArchivePlan {
    pub fn year(&self) -> i32 {
        self.window.year
    }

    /// Record count per source collection, including empty ones.
    pub fn counts(&self) -> BTreeMap<SourceCollection, usize> {
        self.collections
            .iter()
            .map(|(collection, records)| (*collection, records.len()))
            .collect()
    }

    /// Splits the plan into the snapshot to persist and the keys to purge.
    pub fn into_snapshot(self, created_at: i64) -> (ArchivalSnapshot, Vec<DocKey>) {
        let snapshot = ArchivalSnapshot {
            year: self.window.year,
            created_at,
            collections: self.collections,
        };
        (snapshot, self.purge_keys)
    }
}

/// Selects every source record whose `createdAt` lies inside `year`.
///
/// # Errors
/// - `InvalidYear` when the year has no calendar representation.
/// - `NothingToArchive` when no collection has a matching record.
pub fn build_archive<S: DocumentStore + ?Sized>(store: &S, year: i32) -> ClosingResult<ArchivePlan> {
    let window = YearWindow::for_year(year).ok_or_else(|| ClosingError::InvalidYear {
        year,
        reason: "year is outside the supported calendar range".to_string(),
    })?;

    let mut collections = BTreeMap::new();
    let mut purge_keys = Vec::new();
    for collection in SourceCollection::ALL {
        let documents =
            store.query_created_between(collection.as_str(), window.start_ms, window.end_ms)?;
        debug!(
            "event=archive_build module=closing status=ok year={} collection={} matched={}",
            year,
            collection,
            documents.len()
        );
        purge_keys.extend(
            documents
                .iter()
                .map(|document| DocKey::source(collection, document.id.clone())),
        );
        collections.insert(
            collection,
            documents.into_iter().map(ArchivedRecord::from).collect(),
        );
    }

    let total_count = purge_keys.len();
    if total_count == 0 {
        return Err(ClosingError::NothingToArchive { year });
    }

    Ok(ArchivePlan {
        window,
        collections,
        purge_keys,
        total_count,
    })
}
