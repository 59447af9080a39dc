//! Atomic Purge: deletes archived records in store-sized batches.
//!
//! # Invariants
//! - Each batch is atomic; a set larger than the store limit is split.
//! - Deletes of missing documents are no-ops, so re-running a purge after a
//!   partial failure converges to the same state.

use crate::model::document::DocKey;
use crate::store::{DocumentStore, StoreResult, WriteBatch, WriteOp};
use log::{debug, error};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub deleted: usize,
    pub batches: usize,
}

/// Deletes every key, one store batch per `max_batch_ops` keys.
///
/// Stops at the first failing batch; earlier batches stay committed.
pub fn purge<S: DocumentStore + ?Sized>(store: &S, keys: &[DocKey]) -> StoreResult<PurgeReport> {
    let mut report = PurgeReport::default();
    for chunk in keys.chunks(store.max_batch_ops()) {
        let batch: WriteBatch = chunk
            .iter()
            .map(|key| WriteOp::Delete { key: key.clone() })
            .collect();
        if let Err(err) = store.commit(&batch) {
            error!(
                "event=purge_batch module=closing status=error batch={} committed={} error={}",
                report.batches + 1,
                report.deleted,
                err
            );
            return Err(err);
        }
        report.batches += 1;
        report.deleted += chunk.len();
        debug!(
            "event=purge_batch module=closing status=ok batch={} size={}",
            report.batches,
            chunk.len()
        );
    }
    Ok(report)
}
