//! Core of the storefront admin console: the annual closing subsystem.
//!
//! This crate is the single source of truth for closing invariants: which
//! records belong to a year, when they may be purged, and how often a closed
//! year may be restored.

pub mod api;
pub mod closing;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod service;
pub mod store;

pub use closing::{
    ArchiveDeletion, ClosingError, ClosingErrorKind, ClosingResult, ReconcileReport, RevertBudget,
    RevertOutcome,
};
pub use config::{ConfigError, CoreConfig};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::closing::{ClosingControl, ClosingStatus};
pub use model::document::{DocKey, Document, Fields, SourceCollection};
pub use model::snapshot::{ArchivalSnapshot, ArchivedRecord, YearWindow};
pub use service::closing_service::{
    ArchiveListing, ArchiveSummary, ClosingOutcome, ClosingService, UnreadableArchive,
};
pub use service::record_service::{ImportReport, RecordService};
pub use store::{
    DocumentStore, Mutation, Precondition, SqliteDocumentStore, StoreError, StoreResult,
    WriteBatch, WriteOp,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
