//! Failure taxonomy of the closing workflow.

use crate::model::closing::ClosingStatus;
use crate::store::StoreError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type ClosingResult<T> = Result<T, ClosingError>;

/// Caller-facing failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClosingErrorKind {
    Validation,
    EmptyOperation,
    NotFound,
    Conflict,
    BudgetExhausted,
    Storage,
}

impl ClosingErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::EmptyOperation => "empty_operation",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::BudgetExhausted => "budget_exhausted",
            Self::Storage => "storage",
        }
    }
}

#[derive(Debug)]
pub enum ClosingError {
    InvalidYear { year: i32, reason: String },
    /// No record of any source collection falls inside the year.
    NothingToArchive { year: i32 },
    /// The year already has a live archive.
    AlreadyClosed { year: i32, status: ClosingStatus },
    ArchiveNotFound { year: i32 },
    EmptyArchive { year: i32 },
    BudgetNotInitialized,
    BudgetExhausted { remaining: u32, ceiling: u32 },
    /// The budget counter kept changing under concurrent reverts.
    BudgetContention { attempts: u32 },
    /// A multi-batch revert stopped before its final batch.
    RevertIncomplete { year: i32 },
    InvalidData(String),
    Storage(StoreError),
}

impl ClosingError {
    pub fn kind(&self) -> ClosingErrorKind {
        match self {
            Self::InvalidYear { .. } => ClosingErrorKind::Validation,
            Self::NothingToArchive { .. } | Self::EmptyArchive { .. } => {
                ClosingErrorKind::EmptyOperation
            }
            Self::ArchiveNotFound { .. } | Self::BudgetNotInitialized => ClosingErrorKind::NotFound,
            Self::AlreadyClosed { .. }
            | Self::BudgetContention { .. }
            | Self::RevertIncomplete { .. } => ClosingErrorKind::Conflict,
            Self::BudgetExhausted { .. } => ClosingErrorKind::BudgetExhausted,
            Self::InvalidData(_) | Self::Storage(_) => ClosingErrorKind::Storage,
        }
    }
}

impl Display for ClosingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidYear { year, reason } => write!(f, "invalid year {year}: {reason}"),
            Self::NothingToArchive { year } => write!(f, "nothing to archive for year {year}"),
            Self::AlreadyClosed { year, status } => write!(
                f,
                "year {year} is already closed (status `{}`)",
                status.as_str()
            ),
            Self::ArchiveNotFound { year } => write!(f, "no archive found for year {year}"),
            Self::EmptyArchive { year } => {
                write!(f, "archive for year {year} contains no data to restore")
            }
            Self::BudgetNotInitialized => write!(f, "revert counter is not initialized"),
            Self::BudgetExhausted { remaining, ceiling } => write!(
                f,
                "revert budget exhausted: {remaining} of {ceiling} reverts remaining"
            ),
            Self::BudgetContention { attempts } => write!(
                f,
                "revert counter changed concurrently {attempts} times; revert not completed, \
                 the archive is kept and the revert can be retried"
            ),
            Self::RevertIncomplete { year } => write!(
                f,
                "revert of year {year} is incomplete; retry the revert or reconcile the year first"
            ),
            Self::InvalidData(message) => write!(f, "invalid closing data: {message}"),
            Self::Storage(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ClosingError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for ClosingError {
    fn from(value: StoreError) -> Self {
        Self::Storage(value)
    }
}

impl From<serde_json::Error> for ClosingError {
    fn from(value: serde_json::Error) -> Self {
        Self::InvalidData(value.to_string())
    }
}
