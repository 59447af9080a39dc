#![allow(dead_code)]

use serde_json::Value;
use std::cell::Cell;
use std::collections::BTreeMap;
use storefront_core::{
    DocKey, Document, DocumentStore, Fields, Mutation, SourceCollection, StoreError, StoreResult,
    WriteBatch,
};

pub fn fields(value: Value) -> Fields {
    value.as_object().cloned().expect("fields must be a JSON object")
}

/// Writes one live record with the given `createdAt` and extra fields.
pub fn seed<S: DocumentStore + ?Sized>(
    store: &S,
    collection: SourceCollection,
    id: &str,
    created_at: &str,
    extra: Value,
) {
    let mut body = fields(extra);
    body.insert("createdAt".to_string(), Value::from(created_at));
    let mut batch = WriteBatch::new();
    batch.set(DocKey::source(collection, id), body);
    store.commit(&batch).unwrap();
}

/// Every document of every source collection, keyed by collection name.
pub fn live_state<S: DocumentStore + ?Sized>(store: &S) -> BTreeMap<&'static str, Vec<Document>> {
    SourceCollection::ALL
        .into_iter()
        .map(|collection| (collection.as_str(), store.list(collection.as_str()).unwrap()))
        .collect()
}

pub fn live_ids<S: DocumentStore + ?Sized>(store: &S, collection: SourceCollection) -> Vec<String> {
    store
        .list(collection.as_str())
        .unwrap()
        .into_iter()
        .map(|document| document.id)
        .collect()
}

/// Store wrapper that fails the N-th `commit` (1-based) once.
pub struct FaultyStore<S> {
    inner: S,
    fail_on_commit: usize,
    commits: Cell<usize>,
}

impl<S: DocumentStore> FaultyStore<S> {
    pub fn new(inner: S, fail_on_commit: usize) -> Self {
        Self {
            inner,
            fail_on_commit,
            commits: Cell::new(0),
        }
    }

    pub fn commits(&self) -> usize {
        self.commits.get()
    }
}

impl<S: DocumentStore> DocumentStore for FaultyStore<S> {
    fn get(&self, key: &DocKey) -> StoreResult<Option<Document>> {
        self.inner.get(key)
    }

    fn list(&self, collection: &str) -> StoreResult<Vec<Document>> {
        self.inner.list(collection)
    }

    fn query_created_between(
        &self,
        collection: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> StoreResult<Vec<Document>> {
        self.inner.query_created_between(collection, start_ms, end_ms)
    }

    fn commit(&self, batch: &WriteBatch) -> StoreResult<()> {
        let attempt = self.commits.get() + 1;
        self.commits.set(attempt);
        if attempt == self.fail_on_commit {
            return Err(StoreError::InvalidData("injected commit failure".to_string()));
        }
        self.inner.commit(batch)
    }

    fn update(
        &self,
        key: &DocKey,
        mutate: &mut dyn FnMut(Option<&Document>) -> Mutation,
    ) -> StoreResult<Option<Document>> {
        self.inner.update(key, mutate)
    }

    fn max_batch_ops(&self) -> usize {
        self.inner.max_batch_ops()
    }
}
