//! Annual closing subsystem.
//!
//! # Responsibility
//! - Move one year of transactional records into a single archival snapshot
//!   and purge the originals.
//! - Restore, discard, or reconcile archives.
//! - Enforce the process-wide revert budget.
//!
//! # Invariants
//! - `annualClosings/{year}` exists iff the year's records were removed by a
//!   closing that has not since been reverted or deleted.
//! - The snapshot is durable before any purge batch is issued.
//! - Restores, snapshot deletion and the budget charge commit together.

pub mod archive_builder;
pub mod budget;
pub mod deletion;
pub mod error;
pub mod purge;
pub mod reconcile;
pub mod revert;
pub mod status;

pub use archive_builder::{build_archive, ArchivePlan};
pub use budget::{BudgetObservation, RevertBudget};
pub use deletion::{delete_archive, ArchiveDeletion};
pub use error::{ClosingError, ClosingErrorKind, ClosingResult};
pub use purge::{purge, PurgeReport};
pub use reconcile::{reconcile_year, ReconcileReport};
pub use revert::{revert_year, RevertOutcome};
pub use status::{load_control, load_status};
