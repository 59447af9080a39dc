//! Document store contract used by every closing flow.
//!
//! # Responsibility
//! - Expose the primitives the closing workflow relies on: point reads,
//!   collection scans, `createdAt` window queries, atomic write batches with
//!   preconditions, and transactional read-modify-write.
//! - Keep storage engines swappable (SQLite in production, wrappers in tests).
//!
//! # Invariants
//! - `commit` is all-or-nothing for one batch.
//! - A batch larger than `max_batch_ops` is rejected before touching data.
//! - `update` observes and replaces the document inside one transaction.

use crate::db::DbError;
use crate::model::document::{DocKey, DocKeyValidationError, Document, Fields};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod sqlite_store;

pub use sqlite_store::{SqliteDocumentStore, DEFAULT_MAX_BATCH_OPS, MIN_BATCH_OPS};

pub type StoreResult<T> = Result<T, StoreError>;

/// Storage-level failure.
#[derive(Debug)]
pub enum StoreError {
    Db(DbError),
    InvalidKey(DocKeyValidationError),
    /// Persisted or submitted data could not be (de)serialized.
    InvalidData(String),
    /// A `Create` targeted an existing document.
    AlreadyExists(DocKey),
    /// A `Check` did not hold at commit time.
    PreconditionFailed { key: DocKey, reason: String },
    BatchTooLarge { ops: usize, limit: usize },
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidKey(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid document data: {message}"),
            Self::AlreadyExists(key) => write!(f, "document already exists: {key}"),
            Self::PreconditionFailed { key, reason } => {
                write!(f, "precondition failed for {key}: {reason}")
            }
            Self::BatchTooLarge { ops, limit } => {
                write!(f, "batch of {ops} operations exceeds limit of {limit}")
            }
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::InvalidKey(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<DocKeyValidationError> for StoreError {
    fn from(value: DocKeyValidationError) -> Self {
        Self::InvalidKey(value)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::InvalidData(value.to_string())
    }
}

/// Condition that must hold when a batch commits.
#[derive(Debug, Clone, PartialEq)]
pub enum Precondition {
    Exists,
    FieldEquals { field: String, value: Value },
}

/// One operation inside a write batch.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Upsert with full replacement of the field set.
    Set { key: DocKey, fields: Fields },
    /// Insert; fails the batch with `AlreadyExists` if the key is taken.
    Create { key: DocKey, fields: Fields },
    /// Delete; a missing document is not an error.
    Delete { key: DocKey },
    Check {
        key: DocKey,
        precondition: Precondition,
    },
}

impl WriteOp {
    pub fn key(&self) -> &DocKey {
        match self {
            Self::Set { key, .. }
            | Self::Create { key, .. }
            | Self::Delete { key }
            | Self::Check { key, .. } => key,
        }
    }
}

/// Ordered list of operations committed together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: DocKey, fields: Fields) -> &mut Self {
        self.ops.push(WriteOp::Set { key, fields });
        self
    }

    pub fn create(&mut self, key: DocKey, fields: Fields) -> &mut Self {
        self.ops.push(WriteOp::Create { key, fields });
        self
    }

    pub fn delete(&mut self, key: DocKey) -> &mut Self {
        self.ops.push(WriteOp::Delete { key });
        self
    }

    pub fn check(&mut self, key: DocKey, precondition: Precondition) -> &mut Self {
        self.ops.push(WriteOp::Check { key, precondition });
        self
    }

    pub fn push(&mut self, op: WriteOp) -> &mut Self {
        self.ops.push(op);
        self
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl FromIterator<WriteOp> for WriteBatch {
    fn from_iter<T: IntoIterator<Item = WriteOp>>(iter: T) -> Self {
        Self {
            ops: iter.into_iter().collect(),
        }
    }
}

/// Decision returned by an `update` closure.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Keep,
    Put(Fields),
}

/// Transactional document store.
pub trait DocumentStore {
    fn get(&self, key: &DocKey) -> StoreResult<Option<Document>>;
    /// All documents of `collection`, ordered by id.
    fn list(&self, collection: &str) -> StoreResult<Vec<Document>>;
    /// Documents whose `createdAt` lies in `[start_ms, end_ms]`.
    fn query_created_between(
        &self,
        collection: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> StoreResult<Vec<Document>>;
    /// Applies every operation of `batch` atomically.
    fn commit(&self, batch: &WriteBatch) -> StoreResult<()>;
    /// Runs a read-modify-write on one document inside a transaction.
    ///
    /// Returns the document as stored when the transaction commits.
    fn update(
        &self,
        key: &DocKey,
        mutate: &mut dyn FnMut(Option<&Document>) -> Mutation,
    ) -> StoreResult<Option<Document>>;
    /// Maximum number of operations accepted by one `commit`.
    fn max_batch_ops(&self) -> usize;
}

impl<S: DocumentStore + ?Sized> DocumentStore for &S {
    fn get(&self, key: &DocKey) -> StoreResult<Option<Document>> {
        (**self).get(key)
    }

    fn list(&self, collection: &str) -> StoreResult<Vec<Document>> {
        (**self).list(collection)
    }

    fn query_created_between(
        &self,
        collection: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> StoreResult<Vec<Document>> {
        (**self).query_created_between(collection, start_ms, end_ms)
    }

    fn commit(&self, batch: &WriteBatch) -> StoreResult<()> {
        (**self).commit(batch)
    }

    fn update(
        &self,
        key: &DocKey,
        mutate: &mut dyn FnMut(Option<&Document>) -> Mutation,
    ) -> StoreResult<Option<Document>> {
        (**self).update(key, mutate)
    }

    fn max_batch_ops(&self) -> usize {
        (**self).max_batch_ops()
    }
}
