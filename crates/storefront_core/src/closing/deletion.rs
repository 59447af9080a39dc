//! Archive Deletion: discards a snapshot without restoring anything.
//!
//! Delete-if-exists: a missing archive is reported, not raised. The revert
//! budget is never read or written here. A year left `reverting` is refused,
//! since its snapshot still backs records a finished revert would restore.

use crate::closing::error::{ClosingError, ClosingResult};
use crate::closing::status::{control_fields, load_control};
use crate::model::closing::ClosingStatus;
use crate::model::document::DocKey;
use crate::store::{DocumentStore, Precondition, StoreError, WriteBatch};
use serde_json::Value;

const MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveDeletion {
    pub year: i32,
    /// Whether an archive existed and was removed.
    pub existed: bool,
}

/// Permanently removes `annualClosings/{year}`.
///
/// When an archive existed, the year moves to `archiveDeleted` in the same
/// batch as the deletion. The batch is guarded by the status read, so a
/// revert starting concurrently cannot be cut off halfway.
///
/// # Errors
/// - `RevertIncomplete` when the year is `reverting`.
pub fn delete_archive<S: DocumentStore + ?Sized>(
    store: &S,
    year: i32,
    now_ms: i64,
) -> ClosingResult<ArchiveDeletion> {
    let snapshot_key = DocKey::annual_closing(year);
    let status_key = DocKey::closing_status(year);
    let mut attempt = 0;
    loop {
        attempt += 1;
        if store.get(&snapshot_key)?.is_none() {
            return Ok(ArchiveDeletion {
                year,
                existed: false,
            });
        }

        let control = load_control(store, year)?;
        if let Some(control) = &control {
            if control.status == ClosingStatus::Reverting {
                return Err(ClosingError::RevertIncomplete { year });
            }
        }
        let archived_count = control.as_ref().map_or(0, |control| control.archived_count);

        let mut batch = WriteBatch::new();
        batch.check(snapshot_key.clone(), Precondition::Exists);
        if let Some(control) = &control {
            batch.check(
                status_key.clone(),
                Precondition::FieldEquals {
                    field: "status".to_string(),
                    value: Value::from(control.status.as_str()),
                },
            );
        }
        batch.delete(snapshot_key.clone()).set(
            status_key.clone(),
            control_fields(year, ClosingStatus::ArchiveDeleted, archived_count, now_ms)?,
        );

        match store.commit(&batch) {
            Ok(()) => {
                return Ok(ArchiveDeletion {
                    year,
                    existed: true,
                })
            }
            Err(StoreError::PreconditionFailed { key, .. }) if key == snapshot_key => {
                return Ok(ArchiveDeletion {
                    year,
                    existed: false,
                })
            }
            Err(StoreError::PreconditionFailed { key, .. })
                if key == status_key && attempt < MAX_ATTEMPTS => {}
            Err(err) => return Err(err.into()),
        }
    }
}
