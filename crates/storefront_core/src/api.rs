//! Caller-facing API for the admin console.
//!
//! # Responsibility
//! - Expose each closing operation as a call returning a serializable
//!   envelope (`success` + human-readable `message` + payload).
//! - Reject out-of-range years before any store access.
//!
//! # Invariants
//! - Functions never panic and never return `Err`; failures are reported in
//!   the envelope with a stable `errorKind`.
//! - Year inputs are accepted only within `[min_year, current year]`.

use crate::closing::ClosingError;
use crate::model::closing::ClosingStatus;
use crate::model::document::{Fields, SourceCollection};
use crate::service::closing_service::{ArchiveSummary, ClosingService, UnreadableArchive};
use crate::service::record_service::RecordService;
use crate::store::DocumentStore;
use chrono::Datelike;
use serde::Serialize;

/// Response of `perform_annual_closing`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosingResponse {
    pub success: bool,
    pub message: String,
    pub archived_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
}

/// Response of `revert_annual_closing`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevertResponse {
    pub success: bool,
    pub message: String,
    pub restored_count: usize,
    /// Reverts left after this call; present on success only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_reverts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
}

/// Generic action response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
}

/// Response of the revert budget calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevertCountResponse {
    pub success: bool,
    pub message: String,
    pub count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub success: bool,
    pub message: String,
    pub year: i32,
    pub status: Option<ClosingStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveListResponse {
    pub success: bool,
    pub message: String,
    pub archives: Vec<ArchiveSummary>,
    /// Archives that exist but could not be parsed.
    pub unreadable: Vec<UnreadableArchive>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileResponse {
    pub success: bool,
    pub message: String,
    pub purged_count: usize,
    /// `collection/id` of live records missing from the snapshot.
    pub stragglers: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResponse {
    pub success: bool,
    pub message: String,
    pub ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
}

/// Current calendar year in UTC.
pub fn current_year() -> i32 {
    chrono::Utc::now().year()
}

/// Checks `year` against `[min_year, current_year]`.
pub fn validate_year(year: i32, min_year: i32, current_year: i32) -> Result<(), ClosingError> {
    if (min_year..=current_year).contains(&year) {
        Ok(())
    } else {
        Err(ClosingError::InvalidYear {
            year,
            reason: format!("year must be within {min_year}..={current_year}"),
        })
    }
}

/// Archives and purges one year.
pub fn perform_annual_closing<S: DocumentStore>(
    service: &ClosingService<S>,
    year: i32,
) -> ClosingResponse {
    let result = checked_year(service, year).and_then(|()| service.perform_annual_closing(year));
    match result {
        Ok(outcome) => ClosingResponse {
            success: true,
            message: format!(
                "closed year {}: archived {} records",
                outcome.year, outcome.archived_count
            ),
            archived_count: outcome.archived_count,
            error_kind: None,
        },
        Err(err) => ClosingResponse {
            success: false,
            message: err.to_string(),
            archived_count: 0,
            error_kind: Some(err.kind().as_str()),
        },
    }
}

/// Restores one year and spends one revert.
pub fn revert_annual_closing<S: DocumentStore>(
    service: &ClosingService<S>,
    year: i32,
) -> RevertResponse {
    let result = checked_year(service, year).and_then(|()| service.revert_annual_closing(year));
    match result {
        Ok(outcome) => RevertResponse {
            success: true,
            message: format!(
                "reverted year {}: restored {} records, {} reverts remaining",
                outcome.year, outcome.restored_count, outcome.remaining_reverts
            ),
            restored_count: outcome.restored_count,
            remaining_reverts: Some(outcome.remaining_reverts),
            error_kind: None,
        },
        Err(err) => RevertResponse {
            success: false,
            message: err.to_string(),
            restored_count: 0,
            remaining_reverts: None,
            error_kind: Some(err.kind().as_str()),
        },
    }
}

/// Discards the archive of one year; succeeds when no archive exists.
pub fn delete_closing_archive<S: DocumentStore>(
    service: &ClosingService<S>,
    year: i32,
) -> ActionResponse {
    let result = checked_year(service, year).and_then(|()| service.delete_closing_archive(year));
    match result {
        Ok(deletion) if deletion.existed => ActionResponse {
            success: true,
            message: format!("deleted archive for year {}", deletion.year),
            error_kind: None,
        },
        Ok(deletion) => ActionResponse {
            success: true,
            message: format!("no archive to delete for year {}", deletion.year),
            error_kind: None,
        },
        Err(err) => action_failure(&err),
    }
}

pub fn get_revert_count<S: DocumentStore>(service: &ClosingService<S>) -> RevertCountResponse {
    count_response(service.revert_count(), "reverts remaining")
}

pub fn decrement_revert_count<S: DocumentStore>(
    service: &ClosingService<S>,
) -> RevertCountResponse {
    count_response(
        service.decrement_revert_count(),
        "revert spent; reverts remaining",
    )
}

pub fn get_closing_status<S: DocumentStore>(
    service: &ClosingService<S>,
    year: i32,
) -> StatusResponse {
    match service.closing_status(year) {
        Ok(status) => StatusResponse {
            success: true,
            message: format!("year {year} is {}", status.as_str()),
            year,
            status: Some(status),
            error_kind: None,
        },
        Err(err) => StatusResponse {
            success: false,
            message: err.to_string(),
            year,
            status: None,
            error_kind: Some(err.kind().as_str()),
        },
    }
}

pub fn list_closing_archives<S: DocumentStore>(
    service: &ClosingService<S>,
) -> ArchiveListResponse {
    match service.list_archives() {
        Ok(listing) => ArchiveListResponse {
            success: true,
            message: if listing.unreadable.is_empty() {
                format!("{} archives", listing.archives.len())
            } else {
                format!(
                    "{} archives, {} unreadable",
                    listing.archives.len(),
                    listing.unreadable.len()
                )
            },
            archives: listing.archives,
            unreadable: listing.unreadable,
            error_kind: None,
        },
        Err(err) => ArchiveListResponse {
            success: false,
            message: err.to_string(),
            archives: Vec::new(),
            unreadable: Vec::new(),
            error_kind: Some(err.kind().as_str()),
        },
    }
}

pub fn reconcile_annual_closing<S: DocumentStore>(
    service: &ClosingService<S>,
    year: i32,
) -> ReconcileResponse {
    let result =
        checked_year(service, year).and_then(|()| service.reconcile_annual_closing(year));
    match result {
        Ok(report) => ReconcileResponse {
            success: true,
            message: format!(
                "year {} reconciled: purged {}, {} stragglers",
                report.year,
                report.purged_count,
                report.stragglers.len()
            ),
            purged_count: report.purged_count,
            stragglers: report.stragglers.iter().map(ToString::to_string).collect(),
            error_kind: None,
        },
        Err(err) => ReconcileResponse {
            success: false,
            message: err.to_string(),
            purged_count: 0,
            stragglers: Vec::new(),
            error_kind: Some(err.kind().as_str()),
        },
    }
}

/// Imports live records into a source collection named by `collection`.
pub fn import_records<S: DocumentStore>(
    service: &RecordService<S>,
    collection: &str,
    records: Vec<Fields>,
) -> ImportResponse {
    let Some(source) = SourceCollection::parse(collection) else {
        return ImportResponse {
            success: false,
            message: format!("unknown source collection `{collection}`"),
            ids: Vec::new(),
            error_kind: Some("validation"),
        };
    };
    match service.import_records(source, records) {
        Ok(report) => ImportResponse {
            success: true,
            message: format!("imported {} records into {}", report.ids.len(), source),
            ids: report.ids,
            error_kind: None,
        },
        Err(err) => ImportResponse {
            success: false,
            message: err.to_string(),
            ids: Vec::new(),
            error_kind: Some("storage"),
        },
    }
}

fn checked_year<S: DocumentStore>(
    service: &ClosingService<S>,
    year: i32,
) -> Result<(), ClosingError> {
    validate_year(year, service.config().min_year, current_year())
}

fn action_failure(err: &ClosingError) -> ActionResponse {
    ActionResponse {
        success: false,
        message: err.to_string(),
        error_kind: Some(err.kind().as_str()),
    }
}

fn count_response(result: Result<u32, ClosingError>, label: &str) -> RevertCountResponse {
    match result {
        Ok(count) => RevertCountResponse {
            success: true,
            message: format!("{label}: {count}"),
            count: Some(count),
            error_kind: None,
        },
        Err(err) => RevertCountResponse {
            success: false,
            message: err.to_string(),
            count: None,
            error_kind: Some(err.kind().as_str()),
        },
    }
}
