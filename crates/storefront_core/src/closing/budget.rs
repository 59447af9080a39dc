//! Revert Budget Counter.
//!
//! A singleton `appState/revertCounter` document holding `count`: the number
//! of reverts still allowed across all years.
//!
//! # Invariants
//! - `0 <= count <= ceiling` as observed by callers; stored values above the
//!   ceiling are clamped on read.
//! - Nothing in core increments the counter.
//! - Every decrement is a transactional read-modify-write or a batch guarded
//!   by a `count` precondition.

use crate::closing::error::{ClosingError, ClosingResult};
use crate::model::document::{DocKey, Document, Fields};
use crate::store::{DocumentStore, Mutation, Precondition, StoreError, WriteBatch, WriteOp};
use log::{info, warn};
use serde_json::Value;

const COUNT_FIELD: &str = "count";

/// Counter value as read, plus the raw stored value used for compare-and-set.
#[derive(Debug, Clone, PartialEq)]
pub struct BudgetObservation {
    pub remaining: u32,
    stored: Value,
}

/// Injectable revert budget service over any document store.
pub struct RevertBudget<S: DocumentStore> {
    store: S,
    ceiling: u32,
}

impl<S: DocumentStore> RevertBudget<S> {
    pub fn new(store: S, ceiling: u32) -> Self {
        Self { store, ceiling }
    }

    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    /// Returns remaining reverts, creating the counter at the ceiling if absent.
    pub fn get_count(&self) -> ClosingResult<u32> {
        Ok(self.observe()?.remaining)
    }

    /// Reads the counter, lazily creating it with `count = ceiling`.
    ///
    /// Creation uses a `Create` precondition, so concurrent first reads agree
    /// on a single counter document.
    pub fn observe(&self) -> ClosingResult<BudgetObservation> {
        let key = DocKey::revert_counter();
        if let Some(document) = self.store.get(&key)? {
            return self.observation(&document);
        }

        let mut batch = WriteBatch::new();
        batch.create(key.clone(), count_fields(self.ceiling));
        match self.store.commit(&batch) {
            Ok(()) => {
                info!(
                    "event=revert_budget_init module=closing status=ok count={}",
                    self.ceiling
                );
                Ok(BudgetObservation {
                    remaining: self.ceiling,
                    stored: Value::from(self.ceiling),
                })
            }
            Err(StoreError::AlreadyExists(_)) => {
                let document = self
                    .store
                    .get(&key)?
                    .ok_or(ClosingError::BudgetNotInitialized)?;
                self.observation(&document)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Atomically spends one revert and returns the remaining count.
    ///
    /// # Errors
    /// - `BudgetNotInitialized` when the counter document is absent.
    /// - `BudgetExhausted` when `count <= 0`; the counter is left untouched.
    pub fn decrement(&self) -> ClosingResult<u32> {
        let ceiling = self.ceiling;
        let mut outcome: Option<ClosingResult<u32>> = None;
        self.store
            .update(&DocKey::revert_counter(), &mut |current: Option<&Document>| {
                let Some(document) = current else {
                    outcome = Some(Err(ClosingError::BudgetNotInitialized));
                    return Mutation::Keep;
                };
                match stored_count(document).map(|count| clamp(count, ceiling)) {
                    Ok(0) => {
                        outcome = Some(Err(ClosingError::BudgetExhausted {
                            remaining: 0,
                            ceiling,
                        }));
                        Mutation::Keep
                    }
                    Ok(count) => {
                        let next = count - 1;
                        outcome = Some(Ok(next));
                        let mut fields = document.fields.clone();
                        fields.insert(COUNT_FIELD.to_string(), Value::from(next));
                        Mutation::Put(fields)
                    }
                    Err(err) => {
                        outcome = Some(Err(err));
                        Mutation::Keep
                    }
                }
            })?;

        let result = outcome.unwrap_or(Err(ClosingError::BudgetNotInitialized));
        match &result {
            Ok(remaining) => info!(
                "event=revert_budget_decrement module=closing status=ok remaining={remaining}"
            ),
            Err(err) => warn!(
                "event=revert_budget_decrement module=closing status=error error_code={} error={}",
                err.kind().as_str(),
                err
            ),
        }
        result
    }

    /// Operations charging one revert inside a caller-built batch.
    ///
    /// The batch fails with `PreconditionFailed` on the counter key when the
    /// stored value moved since `observed` was read.
    pub fn charge_ops(&self, observed: &BudgetObservation) -> [WriteOp; 2] {
        let key = DocKey::revert_counter();
        [
            WriteOp::Check {
                key: key.clone(),
                precondition: Precondition::FieldEquals {
                    field: COUNT_FIELD.to_string(),
                    value: observed.stored.clone(),
                },
            },
            WriteOp::Set {
                key,
                fields: count_fields(observed.remaining.saturating_sub(1)),
            },
        ]
    }

    fn observation(&self, document: &Document) -> ClosingResult<BudgetObservation> {
        let count = stored_count(document)?;
        Ok(BudgetObservation {
            remaining: clamp(count, self.ceiling),
            stored: document
                .fields
                .get(COUNT_FIELD)
                .cloned()
                .unwrap_or(Value::Null),
        })
    }
}

fn count_fields(count: u32) -> Fields {
    let mut fields = Fields::new();
    fields.insert(COUNT_FIELD.to_string(), Value::from(count));
    fields
}

fn stored_count(document: &Document) -> ClosingResult<i64> {
    document
        .fields
        .get(COUNT_FIELD)
        .and_then(Value::as_i64)
        .ok_or_else(|| {
            ClosingError::InvalidData("revert counter `count` must be an integer".to_string())
        })
}

fn clamp(count: i64, ceiling: u32) -> u32 {
    u32::try_from(count.clamp(0, i64::from(ceiling))).unwrap_or(0)
}
