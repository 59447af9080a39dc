//! Revert Engine: restores a closed year from its snapshot.
//!
//! # Invariants
//! - Budget is checked before any write; a missing or empty archive never
//!   touches the budget.
//! - The final batch holds the snapshot deletion, the `reverted` status, the
//!   budget charge and the last restore chunk; either all commit or none.
//! - Restore chunks committed ahead of the final batch are idempotent `Set`s,
//!   and the year is marked `reverting` before the first of them. Until the
//!   final batch commits, the snapshot stays authoritative: a retried revert
//!   finishes the restore, a reconcile purges the restored records again.

use crate::closing::budget::{BudgetObservation, RevertBudget};
use crate::closing::error::{ClosingError, ClosingResult};
use crate::closing::status::control_fields;
use crate::model::closing::ClosingStatus;
use crate::model::document::DocKey;
use crate::model::snapshot::ArchivalSnapshot;
use crate::store::{DocumentStore, Precondition, StoreError, WriteBatch, WriteOp};
use log::{debug, warn};

/// Operations the final batch carries on top of restored records: snapshot
/// check, counter check, counter set, snapshot delete, status set.
const CONTROL_OPS: usize = 5;
const MAX_CHARGE_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevertOutcome {
    pub year: i32,
    pub restored_count: usize,
    pub remaining_reverts: u32,
    pub batches: usize,
}

/// Restores every record of `year` and deletes its snapshot.
///
/// # Errors
/// - `ArchiveNotFound` when no snapshot exists (or it vanished concurrently).
/// - `EmptyArchive` when the snapshot holds no record.
/// - `BudgetExhausted` when no revert is left.
/// - `BudgetContention` when the counter changed on every attempt.
///
/// Any failure after the first leading restore chunk leaves the year
/// `reverting` with the snapshot and the budget untouched.
pub fn revert_year<S: DocumentStore + ?Sized>(
    store: &S,
    revert_ceiling: u32,
    year: i32,
    now_ms: i64,
) -> ClosingResult<RevertOutcome> {
    let snapshot_key = DocKey::annual_closing(year);
    let document = store
        .get(&snapshot_key)?
        .ok_or(ClosingError::ArchiveNotFound { year })?;
    let snapshot = ArchivalSnapshot::from_document(&document).map_err(ClosingError::InvalidData)?;

    let restores: Vec<WriteOp> = snapshot
        .collections
        .iter()
        .filter(|(_, records)| !records.is_empty())
        .flat_map(|(collection, records)| {
            records.iter().map(move |record| WriteOp::Set {
                key: DocKey::source(*collection, record.id.clone()),
                fields: record.data.clone(),
            })
        })
        .collect();
    if restores.is_empty() {
        return Err(ClosingError::EmptyArchive { year });
    }
    let restored_count = restores.len();

    let budget = RevertBudget::new(store, revert_ceiling);
    let mut observed = budget.observe()?;
    ensure_budget(&observed, revert_ceiling)?;

    let limit = store.max_batch_ops();
    let final_capacity = limit.saturating_sub(CONTROL_OPS).max(1);
    let (leading, trailing) = restores.split_at(restored_count.saturating_sub(final_capacity));

    if !leading.is_empty() {
        let mut batch = WriteBatch::new();
        batch.check(snapshot_key.clone(), Precondition::Exists).set(
            DocKey::closing_status(year),
            control_fields(year, ClosingStatus::Reverting, restored_count as u64, now_ms)?,
        );
        match store.commit(&batch) {
            Ok(()) => {}
            Err(StoreError::PreconditionFailed { key, .. }) if key == snapshot_key => {
                return Err(ClosingError::ArchiveNotFound { year });
            }
            Err(err) => return Err(err.into()),
        }
    }

    let mut batches = 0;
    for chunk in leading.chunks(limit) {
        let batch: WriteBatch = chunk.iter().cloned().collect();
        store.commit(&batch)?;
        batches += 1;
        debug!(
            "event=revert_restore_batch module=closing status=ok year={} batch={} size={}",
            year,
            batches,
            chunk.len()
        );
    }

    let status_fields = control_fields(
        year,
        ClosingStatus::Reverted,
        restored_count as u64,
        now_ms,
    )?;
    for attempt in 1..=MAX_CHARGE_ATTEMPTS {
        let mut batch = WriteBatch::new();
        batch.check(snapshot_key.clone(), Precondition::Exists);
        for op in budget.charge_ops(&observed) {
            batch.push(op);
        }
        for op in trailing {
            batch.push(op.clone());
        }
        batch.delete(snapshot_key.clone());
        batch.set(DocKey::closing_status(year), status_fields.clone());

        match store.commit(&batch) {
            Ok(()) => {
                return Ok(RevertOutcome {
                    year,
                    restored_count,
                    remaining_reverts: observed.remaining - 1,
                    batches: batches + 1,
                })
            }
            Err(StoreError::PreconditionFailed { key, .. }) if key == snapshot_key => {
                return Err(ClosingError::ArchiveNotFound { year });
            }
            Err(StoreError::PreconditionFailed { key, .. })
                if key == DocKey::revert_counter() =>
            {
                warn!(
                    "event=revert_charge module=closing status=retry year={} attempt={}",
                    year, attempt
                );
                observed = budget.observe()?;
                ensure_budget(&observed, revert_ceiling)?;
            }
            Err(err) => return Err(err.into()),
        }
    }

    Err(ClosingError::BudgetContention {
        attempts: MAX_CHARGE_ATTEMPTS,
    })
}

fn ensure_budget(observed: &BudgetObservation, ceiling: u32) -> ClosingResult<()> {
    if observed.remaining == 0 {
        return Err(ClosingError::BudgetExhausted {
            remaining: 0,
            ceiling,
        });
    }
    Ok(())
}
