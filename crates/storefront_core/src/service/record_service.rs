//! Live record use-case service.
//!
//! # Responsibility
//! - Bulk-import documents into source collections.
//! - Read live records back for tooling and verification.
//!
//! # Invariants
//! - Imports are chunked to the store batch limit; each chunk is atomic.
//! - An `id` field names the document and is removed from the stored body.

use crate::model::document::{DocKey, Document, Fields, SourceCollection};
use crate::store::{DocumentStore, StoreError, StoreResult, WriteBatch, WriteOp};
use log::info;
use serde_json::Value;
use uuid::Uuid;

const ID_FIELD: &str = "id";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportReport {
    pub collection: SourceCollection,
    /// Stored ids, in input order.
    pub ids: Vec<String>,
    pub batches: usize,
}

pub struct RecordService<S: DocumentStore> {
    store: S,
}

impl<S: DocumentStore> RecordService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Upserts `records` into `collection`.
    ///
    /// Records without a string `id` receive a generated UUID v4.
    pub fn import_records(
        &self,
        collection: SourceCollection,
        records: Vec<Fields>,
    ) -> StoreResult<ImportReport> {
        let mut ids = Vec::with_capacity(records.len());
        let mut ops = Vec::with_capacity(records.len());
        for mut fields in records {
            let id = match fields.remove(ID_FIELD) {
                Some(Value::String(id)) => id,
                Some(other) => {
                    return Err(StoreError::InvalidData(format!(
                        "record id must be a string, got `{other}`"
                    )))
                }
                None => Uuid::new_v4().to_string(),
            };
            ops.push(WriteOp::Set {
                key: DocKey::source(collection, id.clone()),
                fields,
            });
            ids.push(id);
        }

        let mut batches = 0;
        for chunk in ops.chunks(self.store.max_batch_ops()) {
            let batch: WriteBatch = chunk.iter().cloned().collect();
            self.store.commit(&batch)?;
            batches += 1;
        }
        info!(
            "event=records_import module=records status=ok collection={} count={} batches={}",
            collection,
            ids.len(),
            batches
        );

        Ok(ImportReport {
            collection,
            ids,
            batches,
        })
    }

    pub fn get_record(&self, collection: SourceCollection, id: &str) -> StoreResult<Option<Document>> {
        self.store.get(&DocKey::source(collection, id))
    }

    /// All live records of `collection`, ordered by id.
    pub fn list_records(&self, collection: SourceCollection) -> StoreResult<Vec<Document>> {
        self.store.list(collection.as_str())
    }
}
