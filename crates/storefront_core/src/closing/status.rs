//! Reads and writes of `closingStatus/{year}` control records.

use crate::closing::error::{ClosingError, ClosingResult};
use crate::model::closing::{ClosingControl, ClosingStatus};
use crate::model::document::{DocKey, Fields};
use crate::store::DocumentStore;

/// Loads the control record for `year`, if the year ever left `open`.
pub fn load_control<S: DocumentStore + ?Sized>(
    store: &S,
    year: i32,
) -> ClosingResult<Option<ClosingControl>> {
    store
        .get(&DocKey::closing_status(year))?
        .map(|document| {
            ClosingControl::from_document(&document).map_err(|err| {
                ClosingError::InvalidData(format!("closing status for {year}: {err}"))
            })
        })
        .transpose()
}

/// Current lifecycle state of `year`; `Open` when no record exists.
pub fn load_status<S: DocumentStore + ?Sized>(store: &S, year: i32) -> ClosingResult<ClosingStatus> {
    Ok(load_control(store, year)?.map_or(ClosingStatus::Open, |control| control.status))
}

pub(crate) fn control_fields(
    year: i32,
    status: ClosingStatus,
    archived_count: u64,
    now_ms: i64,
) -> ClosingResult<Fields> {
    let control = ClosingControl {
        year,
        status,
        updated_at: now_ms,
        archived_count,
    };
    Ok(control.to_fields()?)
}
