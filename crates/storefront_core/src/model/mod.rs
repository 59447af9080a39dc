//! Domain model for live records and the annual closing workflow.
//!
//! # Responsibility
//! - Define the document shape shared by every collection.
//! - Define archival snapshots and the per-year closing control record.
//!
//! # Invariants
//! - Every document is addressed by a `(collection, id)` key.
//! - A year is bucketed by `createdAt` evaluated in UTC.

pub mod closing;
pub mod document;
pub mod snapshot;
